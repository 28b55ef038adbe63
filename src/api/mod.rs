//! Account API: token acquisition and asynchronous export requests

pub mod client;

use std::fmt;

use anyhow::anyhow;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::error::Result;

pub use client::AccountApiClient;

/// Header carrying the per-request correlation id
pub const PARTNER_REQUEST_HEADER: &str = "x-id-partner-request";
/// Header carrying the bearer token, both in token responses and in requests
pub const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Opaque bearer token issued by the account API
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Date range of an export, sent as `{"startDate": ..., "endDate": ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ExportPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if start_date > end_date {
            return Err(anyhow!(
                "Start date {} is after end date {}",
                start_date,
                end_date
            ));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// The full calendar month before `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_month = today.with_day(1).unwrap_or(today);
        let end_date = first_of_month - Duration::days(1);
        let start_date = end_date.with_day(1).unwrap_or(end_date);
        Self {
            start_date,
            end_date,
        }
    }

    /// Build a period from typed bounds; a missing or blank bound falls back
    /// to the previous month relative to `today`.
    pub fn from_inputs(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> Result<Self> {
        let default = Self::previous_month(today);
        let bound = |input: Option<&str>, fallback: NaiveDate| match input.map(str::trim) {
            Some(text) if !text.is_empty() => parse_date(text),
            _ => Ok(fallback),
        };
        Self::new(
            bound(start, default.start_date)?,
            bound(end, default.end_date)?,
        )
    }
}

impl fmt::Display for ExportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

/// Parse a date typed by the operator (YYYY-MM-DD or DD/MM/YYYY)
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%d/%m/%Y"))
        .map_err(|_| anyhow!("Invalid date '{}': expected YYYY-MM-DD or DD/MM/YYYY", input))
}

/// Keys under which the registration document carries the holder's name
const HOLDER_KEYS: [&str; 5] = ["holderName", "name", "customerName", "nome", "titular"];

/// Holder name from an account registration document, looked up at the top
/// level and one object deep.
pub fn holder_from_account(document: &serde_json::Value) -> Option<String> {
    let direct = |object: &serde_json::Map<String, serde_json::Value>| {
        HOLDER_KEYS
            .iter()
            .filter_map(|key| object.get(*key)?.as_str())
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    };

    let object = document.as_object()?;
    direct(object).or_else(|| {
        object
            .values()
            .filter_map(serde_json::Value::as_object)
            .find_map(direct)
    })
}

/// Seam between the orchestrator and the remote system, so batches can be
/// driven against a fake in tests.
#[allow(async_fn_in_trait)]
pub trait ExportApi {
    /// Obtain a fresh bearer token; called at startup and again whenever the
    /// export endpoint rejects the current one.
    async fn acquire_token(&self) -> Result<AccessToken>;

    /// Trigger an asynchronous export. Data arrives out-of-band; completion
    /// is signaled through the webhook listener.
    async fn request_export(
        &self,
        client_code: &str,
        period: &ExportPeriod,
        token: &AccessToken,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_serializes_as_api_body() {
        let period = ExportPeriod::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let body = serde_json::to_value(period).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"startDate": "2024-01-01", "endDate": "2024-01-31"})
        );
    }

    #[test]
    fn test_period_rejects_inverted_range() {
        let result = ExportPeriod::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_previous_month_crosses_year_boundary() {
        let period = ExportPeriod::previous_month(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(period.start_date, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(period.end_date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn test_previous_month_handles_leap_february() {
        let period = ExportPeriod::previous_month(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(period.end_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_parse_date_accepts_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(parse_date("2024-05-10").unwrap(), expected);
        assert_eq!(parse_date(" 10/05/2024 ").unwrap(), expected);
        assert!(parse_date("2024/05/10").is_err());
    }

    #[test]
    fn test_period_from_blank_inputs_is_previous_month() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let period = ExportPeriod::from_inputs(Some(""), None, today).unwrap();
        assert_eq!(period, ExportPeriod::previous_month(today));
    }

    #[test]
    fn test_period_from_inputs_mixes_typed_and_default_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let period = ExportPeriod::from_inputs(Some("10/02/2024"), Some(" "), today).unwrap();
        assert_eq!(period.start_date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(period.end_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_period_from_bad_inputs_is_an_error() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert!(ExportPeriod::from_inputs(Some("2024/05/10"), None, today).is_err());
        assert!(ExportPeriod::from_inputs(Some("2024-02-10"), Some("2024-02-01"), today).is_err());
    }

    #[test]
    fn test_holder_from_account_document() {
        let flat = serde_json::json!({"accountNumber": "123", "name": "Maria Silva"});
        assert_eq!(holder_from_account(&flat).as_deref(), Some("Maria Silva"));

        let nested = serde_json::json!({"data": {"holderName": " Joao Souza "}});
        assert_eq!(holder_from_account(&nested).as_deref(), Some("Joao Souza"));

        let anonymous = serde_json::json!({"accountNumber": "123", "name": ""});
        assert_eq!(holder_from_account(&anonymous), None);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("secret-value");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.as_str(), "secret-value");
    }
}
