//! Token issuance and validation for the ThatDam control plane.
//!
//! Three token types share one Ed25519 signing key and are told apart by
//! the `typ` claim:
//!
//! - **PAT** platform access token for users (30 min)
//! - **NJT** node join token for devices, scope `node:join` (10 min)
//! - **NAT** node access token for joined nodes (30 min)
//!
//! Verification material is published as a JWKS document. Validators pin
//! issuer and audience and reject tokens whose `kid` is not in the set.
//!
//! # Example
//!
//! ```no_run
//! use thatdam_auth::TokenIssuer;
//!
//! # fn example() -> thatdam_auth::Result<()> {
//! let issuer = TokenIssuer::generate("k1", "https://auth.example", "thatdam")?;
//! let token = issuer.sign_njt("cam-1", Some("acme"))?;
//! let jwks = issuer.jwks();
//! assert_eq!(jwks.keys[0].kid, "k1");
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

mod claims;
mod config;
pub mod error;
mod issuer;
mod jwks;
mod keys;
mod utils;
mod validator;

pub use claims::Audience;
pub use claims::TokenClaims;
pub use claims::TokenType;
pub use config::AuthConfig;
pub use error::AuthError;
pub use error::Result;
pub use issuer::TokenIssuer;
pub use jwks::Jwk;
pub use jwks::Jwks;
pub use keys::SigningKeyPair;
pub use utils::bearer_token;
pub use utils::current_time_secs;
pub use validator::TokenValidator;
