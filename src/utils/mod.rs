//! Formatting helpers shared by the report pipeline and the console output
//!
//! Brazilian conventions throughout: `.` thousands separator, `,` decimal
//! separator, CNPJ punctuation `XX.XXX.XXX/XXXX-XX`.

use rust_decimal::Decimal;

/// Number of digits in a CNPJ
const CNPJ_DIGITS: usize = 14;

/// Excel number format for Brazilian Real cells (locale id 0x416, pt-BR).
pub const BRL_NUM_FORMAT: &str = "[$R$-416] #,##0.00";

/// Format a Decimal as Brazilian Real: "R$ 1.234,56"
///
/// # Examples
/// ```
/// use movimentacoes::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "R$ 1.234,56");
/// assert_eq!(format_currency(dec!(-500)), "R$ -500,00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    let sign = if value < Decimal::ZERO { "-" } else { "" };
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(integer_part.len() + integer_part.len() / 3);
    for (i, c) in integer_part.chars().enumerate() {
        if i > 0 && (integer_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("R$ {}{},{}", sign, grouped, decimal_part)
}

/// Punctuate a fund tax-id as `XX.XXX.XXX/XXXX-XX`.
///
/// Digits are extracted first, so already punctuated values are stable, and
/// exports that lost leading zeros (numeric CNPJ columns) are left-padded.
/// Anything with more than fourteen digits, or no digits at all, is returned
/// unchanged.
///
/// # Examples
/// ```
/// use movimentacoes::utils::format_cnpj;
///
/// assert_eq!(format_cnpj("12345678000199"), "12.345.678/0001-99");
/// assert_eq!(format_cnpj("12.345.678/0001-99"), "12.345.678/0001-99");
/// ```
pub fn format_cnpj(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > CNPJ_DIGITS {
        return raw.to_string();
    }

    let d = format!("{:0>width$}", digits, width = CNPJ_DIGITS);
    format!(
        "{}.{}.{}/{}-{}",
        &d[0..2],
        &d[2..5],
        &d[5..8],
        &d[8..12],
        &d[12..14]
    )
}
