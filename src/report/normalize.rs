//! Fund tax-id normalization and sign adjustment of credit-like movements

use super::record::MovementRecord;
use crate::utils::format_cnpj;

/// Launch types that move money out of the position; matched as
/// case-insensitive substrings of the launch type label.
pub const CREDIT_KEYWORDS: [&str; 10] = [
    "CRÉDITO",
    "JUROS",
    "JUROS S/ CAPITAL",
    "RECEBIMENTO DIVIDENDOS",
    "RI",
    "RS",
    "VENCIMENTO DE TÍTULO",
    "VENDA",
    "AMORTIZAÇÃO",
    "RENDIMENTO",
];

/// Sub-market of cash balances
const CASH_SUB_MARKET: &str = "CC";
/// Sub-markets whose asset identifier stands in for a missing fund tax-id
const ASSET_KEYED_SUB_MARKETS: [&str; 2] = ["RF", "ACOES"];

pub fn is_credit_like(launch_type: &str) -> bool {
    let upper = launch_type.to_uppercase();
    CREDIT_KEYWORDS.iter().any(|k| upper.contains(k))
}

/// Normalize one record in place.
pub fn normalize_record(record: &mut MovementRecord) {
    record.fund_cnpj = match record.fund_cnpj.take() {
        Some(cnpj) => Some(format_cnpj(&cnpj)),
        None => fallback_fund_id(record),
    };

    if record.launch_type.as_deref().is_some_and(is_credit_like) {
        record.gross_value = record.gross_value.map(|v| -v.abs());
    }
}

fn fallback_fund_id(record: &MovementRecord) -> Option<String> {
    match record.sub_market_name.as_deref() {
        Some(CASH_SUB_MARKET) => Some("cash".to_string()),
        Some(sub) if ASSET_KEYED_SUB_MARKETS.contains(&sub) => record.asset.clone(),
        _ => None,
    }
}
