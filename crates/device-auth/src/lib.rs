//! Device Auth Library
//!
//! Verifies OAuth bearer tokens presented by devices and produces the
//! device identity they carry.
//!
//! # Modules
//!
//! - `auth` - Token authenticator and key resolution
//! - `config` - Configuration from environment or serde
//! - `errors` - Rejection reasons and failure categories
//! - `identity` - Authenticated device identity
//! - `observability` - Logging and metrics setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod identity;
pub mod observability;

pub use auth::{Jwk, JwksClient, KeyResolver, StaticKeyResolver, TokenAuthenticator};
pub use config::{ConfigError, TokenConfig};
pub use errors::{AuthError, FailureCategory, KeyUnavailable};
pub use identity::{AuthenticatedDevice, DeviceId};
