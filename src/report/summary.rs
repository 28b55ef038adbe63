//! "Resumo" sheet: gross values pivoted by launch type per fund, plus the
//! fund's withholding totals.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use super::record::MovementRecord;

pub const FUND_HEADER: &str = "fundCnpj";
pub const IR_HEADER: &str = "irValue";
pub const IOF_HEADER: &str = "iofValue";
pub const IR_TOTAL_HEADER: &str = "irTotal";

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub fund_cnpj: String,
    /// One entry per launch type, aligned with [`SummaryTable::launch_types`]
    pub gross_by_type: Vec<Decimal>,
    pub ir_value: Decimal,
    pub iof_value: Decimal,
    pub ir_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryTable {
    pub launch_types: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn headers(&self) -> Vec<&str> {
        std::iter::once(FUND_HEADER)
            .chain(self.launch_types.iter().map(String::as_str))
            .chain([IR_HEADER, IOF_HEADER, IR_TOTAL_HEADER])
            .collect()
    }

    pub fn row(&self, fund_cnpj: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.fund_cnpj == fund_cnpj)
    }

    /// Pivoted gross value of a (fund, launch type) pair
    pub fn gross(&self, fund_cnpj: &str, launch_type: &str) -> Option<Decimal> {
        let col = self.launch_types.iter().position(|t| t == launch_type)?;
        self.row(fund_cnpj).map(|r| r.gross_by_type[col])
    }
}

#[derive(Debug, Default)]
struct GroupTotals {
    gross: Decimal,
    ir: Decimal,
    iof: Decimal,
}

/// Build the summary from normalized records.
///
/// Rows without a fund tax-id or a launch type cannot be grouped and are left
/// out. Missing amounts count as zero. Funds and launch types come out sorted.
pub fn summarize(records: &[MovementRecord]) -> SummaryTable {
    let mut groups: BTreeMap<(&str, &str), GroupTotals> = BTreeMap::new();
    for record in records {
        let (Some(fund), Some(launch_type)) =
            (record.fund_cnpj.as_deref(), record.launch_type.as_deref())
        else {
            continue;
        };

        let totals = groups.entry((fund, launch_type)).or_default();
        totals.gross += record.gross_value.unwrap_or_default();
        totals.ir += record.ir_value.unwrap_or_default();
        totals.iof += record.iof_value.unwrap_or_default();
    }

    let launch_types: Vec<String> = groups
        .keys()
        .map(|(_, launch_type)| *launch_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows: Vec<SummaryRow> = Vec::new();
    for ((fund, launch_type), totals) in &groups {
        if rows.last().map(|r| r.fund_cnpj.as_str()) != Some(*fund) {
            rows.push(SummaryRow {
                fund_cnpj: fund.to_string(),
                gross_by_type: vec![Decimal::ZERO; launch_types.len()],
                ir_value: Decimal::ZERO,
                iof_value: Decimal::ZERO,
                ir_total: Decimal::ZERO,
            });
        }
        // Keys are sorted by fund first, so the current fund is always last
        if let Some(row) = rows.last_mut() {
            if let Some(col) = launch_types.iter().position(|t| t == launch_type) {
                row.gross_by_type[col] += totals.gross;
            }
            row.ir_value += totals.ir;
            row.iof_value += totals.iof;
            row.ir_total += totals.ir + totals.iof;
        }
    }

    SummaryTable { launch_types, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(fund: Option<&str>, launch_type: &str, gross: Decimal) -> MovementRecord {
        MovementRecord {
            fund_cnpj: fund.map(str::to_string),
            launch_type: Some(launch_type.to_string()),
            gross_value: Some(gross),
            ..Default::default()
        }
    }

    #[test]
    fn test_pivot_fills_missing_combinations_with_zero() {
        let records = vec![
            record(Some("A"), "VENDA", dec!(-10)),
            record(Some("A"), "COMPRA", dec!(20)),
            record(Some("B"), "VENDA", dec!(-5)),
            record(Some("A"), "VENDA", dec!(-1)),
        ];

        let table = summarize(&records);
        assert_eq!(table.launch_types, vec!["COMPRA", "VENDA"]);
        assert_eq!(
            table.headers(),
            vec!["fundCnpj", "COMPRA", "VENDA", "irValue", "iofValue", "irTotal"]
        );
        assert_eq!(table.gross("A", "VENDA"), Some(dec!(-11)));
        assert_eq!(table.gross("A", "COMPRA"), Some(dec!(20)));
        assert_eq!(table.gross("B", "COMPRA"), Some(Decimal::ZERO));
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_withholding_totals_per_fund() {
        let mut with_tax = record(Some("A"), "JUROS", dec!(-50));
        with_tax.ir_value = Some(dec!(5));
        with_tax.iof_value = Some(dec!(1));
        let mut ir_only = record(Some("A"), "RENDIMENTO", dec!(-30));
        ir_only.ir_value = Some(dec!(2));

        let table = summarize(&[with_tax, ir_only]);
        let row = table.row("A").unwrap();
        assert_eq!(row.ir_value, dec!(7));
        assert_eq!(row.iof_value, dec!(1));
        assert_eq!(row.ir_total, dec!(8));
    }

    #[test]
    fn test_rows_without_fund_are_excluded() {
        let table = summarize(&[
            record(None, "VENDA", dec!(-10)),
            record(Some("A"), "COMPRA", dec!(1)),
        ]);
        assert_eq!(table.launch_types, vec!["COMPRA"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_fund_gross_total_matches_records() {
        let records = vec![
            record(Some("A"), "VENDA", dec!(-10.25)),
            record(Some("A"), "COMPRA", dec!(20.10)),
            record(Some("A"), "JUROS", dec!(-0.85)),
            record(Some("B"), "COMPRA", dec!(99)),
        ];
        let table = summarize(&records);
        let pivot_sum: Decimal = table.row("A").unwrap().gross_by_type.iter().copied().sum();
        assert_eq!(pivot_sum, dec!(9.00));
    }
}
