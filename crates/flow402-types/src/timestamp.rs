//! Unix timestamp utilities for the HMAC signature window.
//!
//! Flow402 binds every signed request to a `t=<unix_seconds>` field carried in the
//! `x-f402-sig` header. This type represents that value and the verifier's own
//! clock reading, and provides the skew arithmetic used to reject stale or
//! future-dated signatures.

use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::SystemTime;

/// A Unix timestamp, seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Creates a timestamp from a raw seconds value.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Absolute distance in seconds between two timestamps.
    pub fn abs_diff(&self, other: UnixTimestamp) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UnixTimestamp {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_seconds() {
        let ts: UnixTimestamp = "1729200000".parse().unwrap();
        assert_eq!(ts.as_secs(), 1729200000);
    }

    #[test]
    fn rejects_non_decimal() {
        assert!("not-a-number".parse::<UnixTimestamp>().is_err());
        assert!("-5".parse::<UnixTimestamp>().is_err());
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = UnixTimestamp::from_secs(1000);
        let b = UnixTimestamp::from_secs(1301);
        assert_eq!(a.abs_diff(b), 301);
        assert_eq!(b.abs_diff(a), 301);
    }
}
