//! Bearer token validation.
//!
//! Verifies the signature against a key set, pins issuer and audience, and
//! enforces `exp`/`nbf` with a fixed clock skew tolerance.

use std::time::Duration;
use std::time::Instant;

use jsonwebtoken::Algorithm;
use jsonwebtoken::Validation;
use snafu::OptionExt;
use snafu::ResultExt;
use thatdam_constants::network::HTTP_TIMEOUT_SECS;
use thatdam_constants::tokens::JWKS_REFRESH_MIN_SECS;
use thatdam_constants::tokens::TOKEN_CLOCK_SKEW_SECS;
use thatdam_policy::Principal;
use tokio::sync::RwLock;

use crate::Jwk;
use crate::Jwks;
use crate::TokenClaims;
use crate::error::FetchJwksSnafu;
use crate::error::InvalidTokenSnafu;
use crate::error::MissingKidSnafu;
use crate::error::Result;
use crate::error::UnknownKidSnafu;

/// Where verification keys come from.
enum KeySource {
    /// Fixed set, typically the local issuer's own key.
    Static(Jwks),
    /// Fetched over HTTP and cached.
    Remote(RemoteJwks),
}

struct RemoteJwks {
    url: String,
    client: reqwest::Client,
    cache: RwLock<CachedJwks>,
}

#[derive(Default)]
struct CachedJwks {
    jwks: Jwks,
    fetched_at: Option<Instant>,
}

impl RemoteJwks {
    async fn lookup(&self, kid: &str) -> Result<Jwk> {
        {
            let cache = self.cache.read().await;
            if let Some(jwk) = cache.jwks.find(kid) {
                return Ok(jwk.clone());
            }
            // Tiger Style: unknown kids trigger at most one refetch per window.
            let recently_fetched = cache
                .fetched_at
                .is_some_and(|at| at.elapsed() < Duration::from_secs(JWKS_REFRESH_MIN_SECS));
            if recently_fetched {
                return UnknownKidSnafu { kid }.fail();
            }
        }

        let jwks = self.fetch().await?;
        let mut cache = self.cache.write().await;
        cache.jwks = jwks;
        cache.fetched_at = Some(Instant::now());
        cache.jwks.find(kid).cloned().context(UnknownKidSnafu { kid })
    }

    async fn fetch(&self) -> Result<Jwks> {
        tracing::debug!(url = %self.url, "fetching JWKS");
        let response = self.client.get(&self.url).send().await.context(FetchJwksSnafu { url: self.url.clone() })?;
        let status = response.status();
        if !status.is_success() {
            return crate::error::JwksStatusSnafu {
                url: self.url.clone(),
                status: status.as_u16(),
            }
            .fail();
        }
        response.json::<Jwks>().await.context(FetchJwksSnafu { url: self.url.clone() })
    }
}

/// Validates compact JWS bearer tokens.
pub struct TokenValidator {
    source: KeySource,
    issuer: String,
    audience: String,
    /// Clock skew tolerance in seconds.
    leeway: u64,
}

impl TokenValidator {
    /// Validator over a fixed key set.
    pub fn with_jwks(jwks: Jwks, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            source: KeySource::Static(jwks),
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: TOKEN_CLOCK_SKEW_SECS,
        }
    }

    /// Validator that fetches keys from `url` on first use and on unknown `kid`.
    pub fn remote(url: impl Into<String>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            source: KeySource::Remote(RemoteJwks {
                url: url.into(),
                client,
                cache: RwLock::new(CachedJwks::default()),
            }),
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: TOKEN_CLOCK_SKEW_SECS,
        }
    }

    /// Set clock skew tolerance.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Verify `token` and return its claims.
    ///
    /// Checks, in order:
    /// 1. Header parses and carries a `kid`
    /// 2. `kid` resolves to a key in the set
    /// 3. Signature is valid for that key
    /// 4. `iss` and `aud` match the pinned values
    /// 5. `exp` and `nbf` hold within the leeway
    pub async fn validate_claims(&self, token: &str) -> Result<TokenClaims> {
        let header = jsonwebtoken::decode_header(token).context(InvalidTokenSnafu)?;
        let kid = header.kid.context(MissingKidSnafu)?;
        let jwk = match &self.source {
            KeySource::Static(jwks) => jwks.find(&kid).cloned().context(UnknownKidSnafu { kid: kid.clone() })?,
            KeySource::Remote(remote) => remote.lookup(&kid).await?,
        };
        let key = jwk.decoding_key()?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation).context(InvalidTokenSnafu)?;
        Ok(data.claims)
    }

    /// Verify `token` and map it to a policy principal.
    pub async fn validate(&self, token: &str) -> Result<Principal> {
        self.validate_claims(token).await.map(TokenClaims::into_principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenIssuer;
    use crate::TokenType;
    use crate::current_time_secs;

    const ISS: &str = "https://auth.test";
    const AUD: &str = "thatdam";

    fn issuer() -> TokenIssuer {
        TokenIssuer::generate("k1", ISS, AUD).unwrap()
    }

    fn claims(issuer: &TokenIssuer) -> TokenClaims {
        let now = current_time_secs();
        TokenClaims {
            typ: TokenType::Pat,
            tenant_id: None,
            roles: vec![],
            scopes: vec!["thatdam:read".into()],
            scope: None,
            iss: issuer.issuer().to_string(),
            aud: issuer.audience().into(),
            sub: "alice".into(),
            iat: now,
            nbf: now,
            exp: now + 600,
            jti: "j1".into(),
        }
    }

    // ========================================================================
    // Accepted tokens
    // ========================================================================

    #[tokio::test]
    async fn test_pat_validates_to_principal() {
        let issuer = issuer();
        let token = issuer
            .sign_pat("alice", Some("acme"), &["owner".into()], &["thatdam:read".into()])
            .unwrap();
        let principal = issuer.validator().validate(&token).await.unwrap();
        assert_eq!(principal.sub, "alice");
        assert!(principal.has_scope("thatdam:read"));
        assert_eq!(principal.roles, vec!["owner".to_string()]);
        assert_eq!(principal.tenant.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_njt_and_nat_subjects_and_types() {
        let issuer = issuer();
        let validator = issuer.validator();

        let njt = validator.validate_claims(&issuer.sign_njt("cam-1", None).unwrap()).await.unwrap();
        assert_eq!(njt.typ, TokenType::Njt);
        assert_eq!(njt.sub, "device_cam-1");
        assert_eq!(njt.scopes, vec!["node:join".to_string()]);
        assert!(njt.exp - njt.iat <= 600);

        let nat = validator
            .validate_claims(&issuer.sign_nat("n1", None, &["thatdam:register".into()]).unwrap())
            .await
            .unwrap();
        assert_eq!(nat.typ, TokenType::Nat);
        assert_eq!(nat.sub, "node_n1");
        assert!(nat.exp - nat.iat <= 1800);
    }

    #[tokio::test]
    async fn test_space_separated_scope_claim_is_accepted() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.scopes.clear();
        c.scope = Some("thatdam:register thatdam:read".into());
        let token = issuer.sign_claims(&c).unwrap();
        let principal = issuer.validator().validate(&token).await.unwrap();
        assert!(principal.has_scope("thatdam:register"));
        assert!(principal.has_scope("thatdam:read"));
    }

    // ========================================================================
    // Rejected tokens
    // ========================================================================

    #[tokio::test]
    async fn test_token_signed_by_foreign_key_rejected() {
        let trusted = issuer();
        let forger = TokenIssuer::generate("k1", ISS, AUD).unwrap();
        let token = forger.sign_pat("mallory", None, &[], &["thatdam:admin".into()]).unwrap();
        let err = trusted.validator().validate(&token).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_token");
    }

    #[tokio::test]
    async fn test_unknown_kid_rejected() {
        let trusted = issuer();
        let other = TokenIssuer::generate("k2", ISS, AUD).unwrap();
        let token = other.sign_pat("bob", None, &[], &[]).unwrap();
        let err = trusted.validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, crate::AuthError::UnknownKid { .. }));
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.iss = "https://evil.test".into();
        let token = issuer.sign_claims(&c).unwrap();
        assert!(issuer.validator().validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.aud = "someone-else".into();
        let token = issuer.sign_claims(&c).unwrap();
        assert!(issuer.validator().validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_audience_list_containing_ours_accepted() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.aud = vec!["other-service".to_string(), AUD.to_string()].into();
        let token = issuer.sign_claims(&c).unwrap();
        let principal = issuer.validator().validate(&token).await.unwrap();
        assert_eq!(principal.sub, "alice");
    }

    #[tokio::test]
    async fn test_expired_token_rejected_beyond_skew() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.iat -= 3600;
        c.nbf -= 3600;
        c.exp = current_time_secs() - 120;
        let token = issuer.sign_claims(&c).unwrap();
        assert!(issuer.validator().validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_expiry_within_skew_tolerated() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.exp = current_time_secs() - 5;
        let token = issuer.sign_claims(&c).unwrap();
        assert!(issuer.validator().validate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_not_yet_valid_token_rejected() {
        let issuer = issuer();
        let mut c = claims(&issuer);
        c.nbf = current_time_secs() + 600;
        let token = issuer.sign_claims(&c).unwrap();
        assert!(issuer.validator().validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let err = issuer().validator().validate("not-a-jwt").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_token");
    }
}
