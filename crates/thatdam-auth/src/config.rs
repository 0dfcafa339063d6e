//! Token configuration.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thatdam_constants::tokens::DEFAULT_AUDIENCE;
use thatdam_constants::tokens::DEFAULT_ISSUER;
use thatdam_constants::tokens::DEFAULT_KID;

/// Issuer, audience and key source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected and emitted `iss`.
    pub issuer: String,
    /// Expected and emitted `aud`.
    pub audience: String,
    /// Identifier of the current signing key.
    pub kid: String,
    /// PKCS#8 PEM Ed25519 key; a fresh key is generated when unset.
    pub signing_key_file: Option<PathBuf>,
    /// Remote key set; when set, validation uses it instead of the local key.
    pub jwks_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            kid: DEFAULT_KID.to_string(),
            signing_key_file: None,
            jwks_url: None,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `JWT_ISSUER`/`JWT_ISS`, `JWT_AUD`, `JWT_KID`,
    /// `JWT_SIGNING_KEY_FILE` and `JWKS_URL`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty("JWT_ISSUER").or_else(|| env_nonempty("JWT_ISS")) {
            self.issuer = v;
        }
        if let Some(v) = env_nonempty("JWT_AUD") {
            self.audience = v;
        }
        if let Some(v) = env_nonempty("JWT_KID") {
            self.kid = v;
        }
        if let Some(v) = env_nonempty("JWT_SIGNING_KEY_FILE") {
            self.signing_key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("JWKS_URL") {
            self.jwks_url = Some(v);
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
