//! Ephemeral pairing claims.
//!
//! A claim is an `(id, token)` pair handed to an operator. A device proves
//! possession by fulfilling it with both values; every party watching the
//! claim is signalled exactly once when that happens.
//!
//! ```
//! # async fn example() {
//! use thatdam_claims::ClaimStore;
//!
//! let store = ClaimStore::new();
//! let claim = store.create().unwrap();
//! let watch = store.watch(&claim.id).unwrap();
//! assert!(store.fulfill(&claim.id, &claim.token));
//! assert!(watch.fulfilled().await);
//! assert!(!store.fulfill(&claim.id, &claim.token));
//! # }
//! ```

mod error;
mod store;
mod sweeper;

pub use error::ClaimError;
pub use store::Claim;
pub use store::ClaimStore;
pub use store::ClaimWatch;
pub use sweeper::ClaimSweeper;
