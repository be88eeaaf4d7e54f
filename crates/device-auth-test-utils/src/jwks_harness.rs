//! Test harness for key resolution
//!
//! [`TestJwksServer`] is a wiremock stand-in for the identity provider's
//! JWKS endpoint. [`CountingKeyResolver`] wraps a static key set and counts
//! lookups, for asserting that a check ran before key resolution.

use crate::test_ids::{TEST_AUDIENCE, TEST_ISSUER};
use async_trait::async_trait;
use device_auth::auth::{Jwk, KeyResolver, StaticKeyResolver};
use device_auth::{KeyUnavailable, TokenConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock JWKS endpoint
///
/// # Example
/// ```rust,ignore
/// let jwks = TestJwksServer::start(&[primary_keypair().jwk_json()]).await;
/// let authenticator = TokenAuthenticator::from_config(jwks.config())?;
/// ```
pub struct TestJwksServer {
    server: MockServer,
}

impl TestJwksServer {
    /// Serve the given JWKs
    pub async fn start(keys: &[Value]) -> Self {
        Self::start_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys }))).await
    }

    /// Serve `initial` for the first fetch and `rotated` for every fetch
    /// after it
    pub async fn start_rotating(initial: &[Value], rotated: &[Value]) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": initial })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": rotated })))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Serve an arbitrary response
    pub async fn start_with(response: ResponseTemplate) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of JWKS requests received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Enabled configuration pointing at this server, with the test issuer
    /// and audience
    pub fn config(&self) -> TokenConfig {
        test_config(Some(self.jwks_url()))
    }
}

/// Enabled configuration with the test issuer and audience
pub fn test_config(jwks_url: Option<String>) -> TokenConfig {
    TokenConfig {
        enabled: true,
        issuer: Some(TEST_ISSUER.to_string()),
        audience: Some(TEST_AUDIENCE.to_string()),
        jwks_url,
        ..TokenConfig::default()
    }
}

/// Key resolver over a fixed key set that counts lookups
#[derive(Default)]
pub struct CountingKeyResolver {
    inner: StaticKeyResolver,
    calls: AtomicUsize,
}

impl CountingKeyResolver {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self {
            inner: StaticKeyResolver::new(keys),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyResolver for CountingKeyResolver {
    async fn resolve(&self, kid: &str) -> Result<Jwk, KeyUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(kid).await
    }
}
