//! Claim set carried by every token.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thatdam_policy::Principal;

/// Distinguishes the three token variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Platform access token (user).
    Pat,
    /// Node join token (device).
    Njt,
    /// Node access token (node).
    Nat,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenType::Pat => "pat",
            TokenType::Njt => "njt",
            TokenType::Nat => "nat",
        })
    }
}

/// The `aud` claim: a single audience or a list of them.
///
/// Serialises back to a bare string when it holds exactly one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience(Vec<String>);

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        self.0.iter().any(|a| a == audience)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<String> for Audience {
    fn from(audience: String) -> Self {
        Self(vec![audience])
    }
}

impl From<&str> for Audience {
    fn from(audience: &str) -> Self {
        Self(vec![audience.to_string()])
    }
}

impl From<Vec<String>> for Audience {
    fn from(audiences: Vec<String>) -> Self {
        Self(audiences)
    }
}

impl Serialize for Audience {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(audience) => Self(vec![audience]),
            OneOrMany::Many(audiences) => Self(audiences),
        })
    }
}

/// Registered and private claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub typ: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Space separated scopes, accepted from third-party issuers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub iss: String,
    pub aud: Audience,
    pub sub: String,
    pub iat: u64,
    #[serde(default)]
    pub nbf: u64,
    pub exp: u64,
    pub jti: String,
}

impl TokenClaims {
    /// Union of `scopes` and the space separated `scope` claim.
    pub fn all_scopes(&self) -> Vec<String> {
        let mut out = self.scopes.clone();
        if let Some(scope) = &self.scope {
            for s in scope.split_whitespace() {
                if !out.iter().any(|existing| existing == s) {
                    out.push(s.to_string());
                }
            }
        }
        out
    }

    pub fn into_principal(self) -> Principal {
        let scopes = self.all_scopes();
        Principal::new(self.sub, scopes).with_roles(self.roles).with_tenant(self.tenant_id)
    }
}
