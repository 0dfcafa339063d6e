//! Error types for token issuance and validation.
//!
//! Uses snafu for structured error handling with context.

use snafu::Snafu;

/// Result alias for this crate.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Errors raised while loading keys, signing or validating tokens.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuthError {
    /// The signing key file could not be read.
    #[snafu(display("failed to read signing key {path}: {source}"))]
    ReadKey {
        path: String,
        source: std::io::Error,
    },

    /// The signing key file is not a PKCS#8 Ed25519 key.
    #[snafu(display("failed to parse signing key {path}: {source}"))]
    ParseKey {
        path: String,
        source: ed25519_dalek::pkcs8::Error,
    },

    /// The signing key could not be encoded for the JWT library.
    #[snafu(display("failed to encode signing key: {reason}"))]
    EncodeKey { reason: String },

    /// Signing a token failed.
    #[snafu(display("failed to sign token: {source}"))]
    Sign { source: jsonwebtoken::errors::Error },

    /// The token header carries no `kid`.
    #[snafu(display("token is missing a kid header"))]
    MissingKid,

    /// The token's `kid` is not in the key set.
    #[snafu(display("no verification key for kid {kid}"))]
    UnknownKid { kid: String },

    /// A JWK could not be turned into a verification key.
    #[snafu(display("invalid verification key {kid}: {source}"))]
    BadJwk {
        kid: String,
        source: jsonwebtoken::errors::Error,
    },

    /// Signature, issuer, audience or time checks failed.
    #[snafu(display("invalid token: {source}"))]
    InvalidToken { source: jsonwebtoken::errors::Error },

    /// Fetching the remote key set failed.
    #[snafu(display("failed to fetch JWKS from {url}: {source}"))]
    FetchJwks { url: String, source: reqwest::Error },

    /// The remote key set endpoint answered with a non-success status.
    #[snafu(display("JWKS endpoint {url} returned {status}"))]
    JwksStatus { url: String, status: u16 },
}

impl AuthError {
    /// Stable error kind reported at the HTTP boundary.
    ///
    /// Every validation failure collapses to `invalid_token`.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingKid
            | AuthError::UnknownKid { .. }
            | AuthError::BadJwk { .. }
            | AuthError::InvalidToken { .. } => "invalid_token",
            AuthError::FetchJwks { .. } | AuthError::JwksStatus { .. } => "invalid_token",
            AuthError::ReadKey { .. } | AuthError::ParseKey { .. } | AuthError::EncodeKey { .. } => {
                "config_invalid"
            }
            AuthError::Sign { .. } => "internal",
        }
    }

    /// True when the error describes a rejected token rather than a local fault.
    pub fn is_rejection(&self) -> bool {
        self.kind() == "invalid_token"
    }
}
