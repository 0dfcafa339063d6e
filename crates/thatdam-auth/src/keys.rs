//! Ed25519 signing key material.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use jsonwebtoken::EncodingKey;
use rand::rngs::OsRng;
use snafu::ResultExt;

use crate::Jwk;
use crate::error::AuthError;
use crate::error::ParseKeySnafu;
use crate::error::ReadKeySnafu;
use crate::error::Result;

/// Process-local signing key tagged with its key identifier.
///
/// Rotation means building a new pair with a new `kid`.
pub struct SigningKeyPair {
    kid: String,
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh random key.
    pub fn generate(kid: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load a PKCS#8 PEM encoded Ed25519 key from disk.
    pub fn from_pem_file(kid: impl Into<String>, path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path).context(ReadKeySnafu {
            path: path.display().to_string(),
        })?;
        let signing_key = SigningKey::from_pkcs8_pem(&pem).context(ParseKeySnafu {
            path: path.display().to_string(),
        })?;
        Ok(Self {
            kid: kid.into(),
            signing_key,
        })
    }

    /// Export the key as PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AuthError::EncodeKey { reason: e.to_string() })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub(crate) fn encoding_key(&self) -> Result<EncodingKey> {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| AuthError::EncodeKey { reason: e.to_string() })?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }

    /// Public half as a JWK.
    pub fn jwk(&self) -> Jwk {
        let x = URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes());
        Jwk::ed25519(self.kid.clone(), x)
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair").field("kid", &self.kid).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_round_trip_preserves_public_key() {
        let pair = SigningKeyPair::generate("k1");
        let pem = pair.to_pem().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");
        std::fs::write(&path, pem).unwrap();

        let loaded = SigningKeyPair::from_pem_file("k1", &path).unwrap();
        assert_eq!(loaded.jwk(), pair.jwk());
    }

    #[test]
    fn test_missing_key_file_reports_path() {
        let err = SigningKeyPair::from_pem_file("k1", Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/key.pem"));
        assert_eq!(err.kind(), "config_invalid");
    }

    #[test]
    fn test_debug_hides_secret() {
        let pair = SigningKeyPair::generate("k9");
        let dbg = format!("{pair:?}");
        assert!(dbg.contains("k9"));
        assert!(!dbg.contains("signing_key"));
    }
}
