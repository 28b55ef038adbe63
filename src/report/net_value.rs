//! Net value derivation

use rust_decimal::Decimal;

use super::record::MovementRecord;

/// `gross - ir - iof`, or just `gross` when either withholding is absent.
pub fn net_value(
    gross: Option<Decimal>,
    ir: Option<Decimal>,
    iof: Option<Decimal>,
) -> Option<Decimal> {
    let gross = gross?;
    match (ir, iof) {
        (Some(ir), Some(iof)) => Some(gross - ir - iof),
        _ => Some(gross),
    }
}

pub fn derive_net_value(record: &mut MovementRecord) {
    record.net_value = net_value(record.gross_value, record.ir_value, record.iof_value);
}
