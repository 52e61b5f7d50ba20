//! Correlation references embedded in outbound requests
//!
//! Every provider echoes the reference back on callbacks, which is how a
//! delivery is matched to the payment that started it.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt;

/// `{academy_id}-{payment_id}-{unix_time}`; a missing payment id renders as 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationReference {
    pub academy_id: u64,
    pub payment_id: u64,
    pub timestamp: i64,
}

impl CorrelationReference {
    pub fn new(academy_id: u64, payment_id: Option<u64>) -> Self {
        Self::at(academy_id, payment_id, Utc::now())
    }

    pub fn at(academy_id: u64, payment_id: Option<u64>, now: DateTime<Utc>) -> Self {
        Self {
            academy_id,
            payment_id: payment_id.unwrap_or(0),
            timestamp: now.timestamp(),
        }
    }

    pub fn parse(reference: &str) -> Option<Self> {
        let mut parts = reference.trim().splitn(3, '-');
        let academy_id = parts.next()?.parse().ok()?;
        let payment_id = parts.next()?.parse().ok()?;
        let timestamp = parts.next()?.parse().ok()?;
        Some(Self {
            academy_id,
            payment_id,
            timestamp,
        })
    }

    /// Payment id, `None` when the reference was built without one
    pub fn payment_id(&self) -> Option<u64> {
        (self.payment_id != 0).then_some(self.payment_id)
    }

    /// Integer form for providers that only accept numeric references:
    /// `yymmddHHMMSS` followed by the last two digits of the payment id
    pub fn numeric(&self) -> u64 {
        let time = DateTime::<Utc>::from_timestamp(self.timestamp, 0).unwrap_or_default();
        let stamp = u64::from(time.year().rem_euclid(100) as u32) * 10_000_000_000
            + u64::from(time.month()) * 100_000_000
            + u64::from(time.day()) * 1_000_000
            + u64::from(time.hour()) * 10_000
            + u64::from(time.minute()) * 100
            + u64::from(time.second());
        stamp * 100 + self.payment_id % 100
    }
}

impl fmt::Display for CorrelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.academy_id, self.payment_id, self.timestamp)
    }
}

/// Reference used for hosted card-capture sessions
pub fn tokenization_reference(user_id: u64, now: DateTime<Utc>) -> String {
    format!("TOKEN-{}-{}", user_id, now.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 29, 9, 45, 0).unwrap()
    }

    #[test]
    fn test_format_and_parse() {
        let reference = CorrelationReference::at(7, Some(1234), fixed_time());
        let text = reference.to_string();
        assert_eq!(text, format!("7-1234-{}", fixed_time().timestamp()));
        assert_eq!(CorrelationReference::parse(&text), Some(reference));
    }

    #[test]
    fn test_missing_payment_id_renders_zero() {
        let reference = CorrelationReference::at(3, None, fixed_time());
        assert!(reference.to_string().starts_with("3-0-"));
        assert_eq!(reference.payment_id(), None);
    }

    #[test]
    fn test_numeric_form() {
        let reference = CorrelationReference::at(1, Some(12), fixed_time());
        assert_eq!(reference.numeric(), 26_012_909_450_012);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(CorrelationReference::parse("TOKEN-5-123"), None);
        assert_eq!(CorrelationReference::parse("1-2"), None);
    }

    #[test]
    fn test_tokenization_reference() {
        assert_eq!(
            tokenization_reference(5, fixed_time()),
            format!("TOKEN-5-{}", fixed_time().timestamp())
        );
    }
}
