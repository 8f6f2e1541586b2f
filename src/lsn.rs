use serde::{Deserialize, Serialize};
use std::fmt;

/// WAL position (Log Sequence Number) as a 64-bit magnitude.
///
/// PostgreSQL reports positions as `HIGH/LOW`, two hexadecimal components of
/// up to 32 bits each; the magnitude is `high * 2^32 + low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    /// Parse a `HIGH/LOW` hex pair into an LSN.
    ///
    /// Malformed input (empty string, missing slash, non-hex digits, a
    /// component wider than 32 bits) parses to `Lsn(0)`. Callers only use
    /// the value for delta computation, where a zero baseline yields the
    /// non-negative outcome.
    pub fn parse(text: &str) -> Lsn {
        let Some((high, low)) = text.split_once('/') else {
            return Lsn::ZERO;
        };

        match (
            u32::from_str_radix(high, 16),
            u32::from_str_radix(low, 16),
        ) {
            (Ok(high), Ok(low)) => Lsn(((high as u64) << 32) | low as u64),
            _ => Lsn::ZERO,
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:08X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

/// Bytes of WAL advancement between two observed positions.
///
/// An empty or `"null"` previous position means there is no baseline yet and
/// reports zero growth. A current position at or behind the previous one also
/// reports zero; the log can appear to not-advance between polls on an idle
/// database, and growth is never negative.
pub fn delta(current: &str, previous: &str) -> u64 {
    if previous.is_empty() || previous == "null" {
        return 0;
    }

    Lsn::parse(current)
        .as_u64()
        .saturating_sub(Lsn::parse(previous).as_u64())
}
