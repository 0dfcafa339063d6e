//! Token lifetimes and validation tolerances.

/// Platform access token lifetime (30 minutes).
pub const PAT_TTL_SECS: u64 = 30 * 60;

/// Node join token lifetime (10 minutes).
pub const NJT_TTL_SECS: u64 = 10 * 60;

/// Node access token lifetime (30 minutes).
pub const NAT_TTL_SECS: u64 = 30 * 60;

/// Clock skew tolerance applied to `exp`/`nbf` (30 seconds).
pub const TOKEN_CLOCK_SKEW_SECS: u64 = 30;

/// Minimum interval between remote JWKS refetches on an unknown `kid` (30 seconds).
///
/// Tiger Style: Bounded so forged `kid` headers cannot hammer the key server.
pub const JWKS_REFRESH_MIN_SECS: u64 = 30;

/// Default token issuer.
pub const DEFAULT_ISSUER: &str = "https://auth.thatdamtoolbox.cloud";

/// Default token audience.
pub const DEFAULT_AUDIENCE: &str = "thatdamtoolbox";

/// Default signing key identifier.
pub const DEFAULT_KID: &str = "k1";
