//! Request handlers, grouped by API surface.

pub mod claims;
pub mod health;
pub mod leader;
pub mod nodes;
pub mod tenancy;
pub mod tokens;
