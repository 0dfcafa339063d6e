//! Token minting.

use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use snafu::ResultExt;
use thatdam_constants::tokens::NAT_TTL_SECS;
use thatdam_constants::tokens::NJT_TTL_SECS;
use thatdam_constants::tokens::PAT_TTL_SECS;
use thatdam_policy::scopes;

use crate::AuthConfig;
use crate::Jwks;
use crate::SigningKeyPair;
use crate::TokenClaims;
use crate::TokenType;
use crate::TokenValidator;
use crate::error::Result;
use crate::error::SignSnafu;
use crate::utils::current_time_secs;

/// Signs PAT, NJT and NAT tokens with a single process-local key.
pub struct TokenIssuer {
    key: SigningKeyPair,
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(key: SigningKeyPair, issuer: impl Into<String>, audience: impl Into<String>) -> Result<Self> {
        let encoding_key = key.encoding_key()?;
        Ok(Self {
            key,
            encoding_key,
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    /// Issuer backed by a freshly generated key.
    pub fn generate(kid: &str, issuer: &str, audience: &str) -> Result<Self> {
        Self::new(SigningKeyPair::generate(kid), issuer, audience)
    }

    /// Build from configuration, loading the key file when one is set.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let key = match &config.signing_key_file {
            Some(path) => SigningKeyPair::from_pem_file(config.kid.clone(), path)?,
            None => {
                tracing::info!(kid = %config.kid, "no signing key file configured, generating ephemeral key");
                SigningKeyPair::generate(config.kid.clone())
            }
        };
        Self::new(key, config.issuer.clone(), config.audience.clone())
    }

    pub fn kid(&self) -> &str {
        self.key.kid()
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Platform access token for a user.
    pub fn sign_pat(&self, user_sub: &str, tenant: Option<&str>, roles: &[String], scopes: &[String]) -> Result<String> {
        self.sign(TokenType::Pat, user_sub.to_string(), tenant, roles.to_vec(), scopes.to_vec(), PAT_TTL_SECS)
    }

    /// Node join token for a device; carries only `node:join`.
    pub fn sign_njt(&self, device_id: &str, tenant: Option<&str>) -> Result<String> {
        self.sign(
            TokenType::Njt,
            format!("device_{device_id}"),
            tenant,
            Vec::new(),
            vec![scopes::NODE_JOIN.to_string()],
            NJT_TTL_SECS,
        )
    }

    /// Node access token for a joined node.
    pub fn sign_nat(&self, node_id: &str, tenant: Option<&str>, scopes: &[String]) -> Result<String> {
        self.sign(TokenType::Nat, format!("node_{node_id}"), tenant, Vec::new(), scopes.to_vec(), NAT_TTL_SECS)
    }

    fn sign(
        &self,
        typ: TokenType,
        sub: String,
        tenant: Option<&str>,
        roles: Vec<String>,
        scopes: Vec<String>,
        ttl_secs: u64,
    ) -> Result<String> {
        let now = current_time_secs();
        let claims = TokenClaims {
            typ,
            tenant_id: tenant.map(str::to_string),
            roles,
            scopes,
            scope: None,
            iss: self.issuer.clone(),
            aud: self.audience.clone().into(),
            sub,
            iat: now,
            nbf: now,
            exp: now + ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        self.sign_claims(&claims)
    }

    /// Sign an arbitrary claim set with the current key and `kid`.
    pub fn sign_claims(&self, claims: &TokenClaims) -> Result<String> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.key.kid().to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).context(SignSnafu)
    }

    /// Public verification material.
    pub fn jwks(&self) -> Jwks {
        Jwks::new(vec![self.key.jwk()])
    }

    /// Validator pinned to this issuer's key, issuer and audience.
    pub fn validator(&self) -> TokenValidator {
        TokenValidator::with_jwks(self.jwks(), self.issuer.clone(), self.audience.clone())
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("kid", &self.key.kid())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}
