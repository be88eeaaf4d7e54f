//! Bearer-token authentication.
//!
//! - `authenticator` - the verification pipeline
//! - `claims` - typed access to device token claims
//! - `jwks` - key resolution and the caching JWKS client
//! - `jwt` - structural parsing and signature verification

pub mod authenticator;
pub mod claims;
pub mod jwks;
pub mod jwt;

pub use authenticator::TokenAuthenticator;
pub use jwks::{Jwk, JwksClient, JwksResponse, KeyResolver, StaticKeyResolver};
