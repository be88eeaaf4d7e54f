//! Builder for device token claims
//!
//! Defaults describe a valid token for the test provider: the test account,
//! device 1, the test issuer and audience, expiring in an hour.

use crate::test_ids::{TEST_ACCOUNT_ID, TEST_AUDIENCE, TEST_ISSUER};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Builder for device token claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_device(3)
///     .expires_in(-30)
///     .build();
/// let token = primary_keypair().sign(&claims);
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(TEST_ACCOUNT_ID.to_string()));
        claims.insert("device_id".to_string(), json!(1));
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the subject to an account UUID
    pub fn for_account(self, account: Uuid) -> Self {
        self.with_claim("sub", json!(account.to_string()))
    }

    /// Set the device id
    pub fn for_device(self, device_id: i64) -> Self {
        self.with_claim("device_id", json!(device_id))
    }

    /// Set the issuer
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set the audience
    pub fn for_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.with_claim("nbf", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set the primary device last-seen time
    pub fn last_seen_at(self, epoch_seconds: i64) -> Self {
        self.with_claim("primary_device_last_seen_epoch_seconds", json!(epoch_seconds))
    }

    /// Set any claim to any JSON value
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
