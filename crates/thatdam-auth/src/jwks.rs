//! JSON Web Key Set published at `/.well-known/jwks.json`.

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;

use crate::error::BadJwkSnafu;
use crate::error::Result;

/// One public verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    /// Base64url public key bytes for OKP keys.
    #[serde(default)]
    pub x: String,
}

impl Jwk {
    /// Ed25519 signing key entry.
    pub fn ed25519(kid: String, x: String) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: Some("Ed25519".to_string()),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
            kid,
            x,
        }
    }

    pub(crate) fn decoding_key(&self) -> Result<DecodingKey> {
        DecodingKey::from_ed_components(&self.x).context(BadJwkSnafu { kid: self.kid.clone() })
    }
}

/// Key set keyed by `kid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Find the key with the given identifier.
    ///
    /// Only signing keys of type OKP are considered.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|k| k.kid == kid && k.kty == "OKP" && k.key_use.as_deref().unwrap_or("sig") == "sig")
    }
}
