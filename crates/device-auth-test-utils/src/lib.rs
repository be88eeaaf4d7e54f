//! # Device Auth Test Utilities
//!
//! Shared test utilities for device token authentication.
//!
//! This crate provides:
//! - Deterministic RSA fixtures (fixed keys for reproducible tests)
//! - A claims builder (TestTokenBuilder)
//! - A mock JWKS endpoint and a counting key resolver
//! - Fixed test IDs (UUIDs, issuer, audience, key ids)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use device_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = primary_keypair();
//!     let jwks = TestJwksServer::start(&[keypair.jwk_json()]).await;
//!     let authenticator = TokenAuthenticator::from_config(jwks.config()).unwrap();
//!
//!     let token = keypair.sign(&TestTokenBuilder::new().for_device(3).build());
//!     assert!(authenticator.authenticate(&token).await.is_some());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_harness;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_harness::*;
pub use test_ids::*;
pub use token_builders::*;
