//! Small helpers shared by issuer and validator.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Get current Unix timestamp in seconds.
///
/// Returns 0 if system time is before UNIX epoch instead of panicking.
#[inline]
pub fn current_time_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Extract the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` (scheme is case-insensitive). Returns `None`
/// for other schemes or an empty token.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}
