//! Authorization policy for the ThatDam control plane.
//!
//! A policy is a pure gate between an authenticated [`Principal`] and an
//! [`Action`]. It never performs I/O and is safe to share across request
//! handlers.
//!
//! # Example
//!
//! ```
//! use thatdam_policy::{Action, EnvPolicy, PolicyConfig, PolicyEngine, Principal};
//!
//! let strict = EnvPolicy::new(PolicyConfig::default());
//! assert!(!strict.allow(&Principal::anonymous(), Action::Register));
//!
//! let open = EnvPolicy::new(PolicyConfig {
//!     allow_anonymous_proxy: true,
//!     ..PolicyConfig::default()
//! });
//! assert!(open.allow(&Principal::anonymous(), Action::Register));
//! assert!(!open.allow(&Principal::anonymous(), Action::Heartbeat));
//! ```

mod action;
mod engine;
mod principal;

pub use action::Action;
pub use action::ParseActionError;
pub use engine::EnvPolicy;
pub use engine::PolicyConfig;
pub use engine::PolicyEngine;
pub use principal::Principal;
pub use principal::scopes;
