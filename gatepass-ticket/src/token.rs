//! Verification token embedded in a ticket's scannable code.
//!
//! Format: `<ticket_id>|<window>`, where `window` is the wall-clock time
//! bucket the token was encoded in. The window makes the displayed code
//! rotate; whether a verifier checks it is decided by [`WindowPolicy`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use gatepass_core::{CoreError, CoreResult};

pub const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("missing '{}' delimiter", DELIMITER)]
    MissingDelimiter,
    #[error("empty ticket id")]
    EmptyTicketId,
    #[error("ticket id contains '{}'", DELIMITER)]
    DelimiterInTicketId,
    #[error("time window is not an integer: {0}")]
    InvalidWindow(String),
}

impl From<TokenError> for CoreError {
    fn from(err: TokenError) -> Self {
        CoreError::MalformedToken(err.to_string())
    }
}

pub fn encode(ticket_id: &str, window: i64) -> Result<String, TokenError> {
    if ticket_id.is_empty() {
        return Err(TokenError::EmptyTicketId);
    }
    if ticket_id.contains(DELIMITER) {
        return Err(TokenError::DelimiterInTicketId);
    }
    Ok(format!("{}{}{}", ticket_id, DELIMITER, window))
}

pub fn decode(token: &str) -> Result<(String, i64), TokenError> {
    let (ticket_id, window) = token.trim().split_once(DELIMITER).ok_or(TokenError::MissingDelimiter)?;
    if ticket_id.is_empty() {
        return Err(TokenError::EmptyTicketId);
    }
    let window = window
        .parse::<i64>()
        .map_err(|_| TokenError::InvalidWindow(window.to_string()))?;
    Ok((ticket_id.to_string(), window))
}

/// Coarse time bucket containing `now`.
pub fn current_window(now: DateTime<Utc>, width_secs: i64) -> i64 {
    now.timestamp().div_euclid(width_secs.max(1))
}

/// How often a displayed token is re-encoded and how wide each window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRotation {
    pub window_secs: i64,
    pub refresh_secs: u64,
}

impl TokenRotation {
    pub fn new(window_secs: i64, refresh_secs: u64) -> Self {
        Self { window_secs: window_secs.max(1), refresh_secs: refresh_secs.max(1) }
    }

    pub fn window_at(&self, now: DateTime<Utc>) -> i64 {
        current_window(now, self.window_secs)
    }

    pub fn token_at(&self, ticket_id: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        encode(ticket_id, self.window_at(now))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

impl Default for TokenRotation {
    fn default() -> Self {
        Self::new(60, 10)
    }
}

/// Whether verification looks at the token's time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPolicy {
    /// First scan wins; a token's age is irrelevant.
    #[default]
    Unchecked,
    /// Reject windows older than this many windows, or from the future.
    MaxAge(i64),
}

impl WindowPolicy {
    pub fn from_max_age(max_age_windows: Option<i64>) -> Self {
        match max_age_windows {
            Some(n) => WindowPolicy::MaxAge(n.max(0)),
            None => WindowPolicy::Unchecked,
        }
    }

    pub fn check(&self, window: i64, current: i64) -> CoreResult<()> {
        match *self {
            WindowPolicy::Unchecked => Ok(()),
            WindowPolicy::MaxAge(max_age) => {
                // Windows come from scanned text, so any i64 is possible.
                let too_old = current.checked_sub(window).map_or(true, |age| age > max_age);
                if window > current || too_old {
                    Err(CoreError::ExpiredToken { window, current })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_round_trip() {
        for (id, window) in [("abc123", 0), ("7f3c9e2a", 29_000_000), ("x", -5)] {
            let token = encode(id, window).unwrap();
            assert_eq!(decode(&token).unwrap(), (id.to_string(), window));
        }
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(decode("abc123"), Err(TokenError::MissingDelimiter));
        assert_eq!(decode("|29000000"), Err(TokenError::EmptyTicketId));
        assert_eq!(decode(""), Err(TokenError::MissingDelimiter));
        assert!(matches!(decode("abc|soon"), Err(TokenError::InvalidWindow(_))));
        assert!(matches!(
            CoreError::from(TokenError::MissingDelimiter),
            CoreError::MalformedToken(_)
        ));
    }

    #[test]
    fn test_encode_rejects_unencodable_ids() {
        assert_eq!(encode("", 1), Err(TokenError::EmptyTicketId));
        assert_eq!(encode("a|b", 1), Err(TokenError::DelimiterInTicketId));
    }

    #[test]
    fn test_window_buckets_by_width() {
        let rotation = TokenRotation::new(60, 10);
        let t0 = Utc.timestamp_opt(6_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(6_059, 0).unwrap();
        let t2 = Utc.timestamp_opt(6_060, 0).unwrap();

        assert_eq!(rotation.window_at(t0), 100);
        assert_eq!(rotation.window_at(t1), 100);
        assert_eq!(rotation.window_at(t2), 101);
        assert_eq!(rotation.token_at("abc", t2).unwrap(), "abc|101");
    }

    #[test]
    fn test_window_policy() {
        assert!(WindowPolicy::Unchecked.check(0, 1_000_000).is_ok());

        let policy = WindowPolicy::from_max_age(Some(1));
        assert!(policy.check(100, 100).is_ok());
        assert!(policy.check(99, 100).is_ok());
        assert!(matches!(policy.check(98, 100), Err(CoreError::ExpiredToken { .. })));
        assert!(policy.check(101, 100).is_err());
    }

    #[test]
    fn test_window_policy_extreme_windows() {
        let policy = WindowPolicy::MaxAge(2);

        assert!(matches!(policy.check(i64::MIN, 29_000_000), Err(CoreError::ExpiredToken { .. })));
        assert!(matches!(policy.check(i64::MAX, 29_000_000), Err(CoreError::ExpiredToken { .. })));
        assert!(matches!(policy.check(i64::MIN, i64::MAX), Err(CoreError::ExpiredToken { .. })));
        assert!(policy.check(i64::MAX, i64::MAX).is_ok());
        assert!(WindowPolicy::Unchecked.check(i64::MIN, 29_000_000).is_ok());
    }
}
