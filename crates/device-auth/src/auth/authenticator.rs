//! Bearer-token authenticator.
//!
//! Turns an opaque token string into an [`AuthenticatedDevice`] or nothing.
//! Checks run cheapest first and stop at the first failure:
//!
//! 1. blank token
//! 2. structure (size, segments, header, payload) without the signature
//! 3. configured algorithm is the accepted one
//! 4. header `kid` present, header `alg` matches
//! 5. key resolution and key type
//! 6. signature, `exp`/`nbf` with leeway, issuer, audience
//! 7. typed claims: account, device id, primary device last seen
//!
//! Every failure is "no identity" to the caller. Only unexpected failures
//! are logged above debug.

use crate::auth::claims::DeviceClaims;
use crate::auth::jwks::{Jwk, JwksClient, KeyResolver};
use crate::auth::jwt::{parse_unverified, verify_signature, VerifierSettings, ACCEPTED_ALGORITHM};
use crate::config::{ConfigError, TokenConfig, DEFAULT_ALGORITHM};
use crate::errors::{AuthError, FailureCategory, KeyUnavailable};
use crate::identity::AuthenticatedDevice;
use crate::observability::metrics;
use chrono::Utc;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;
use tracing::instrument;

const RSA_KEY_TYPE: &str = "RSA";
const SIGNATURE_KEY_USE: &str = "sig";

/// Authenticates device bearer tokens against a [`KeyResolver`].
///
/// Holds only immutable configuration and a shared resolver, so one instance
/// serves concurrent requests.
pub struct TokenAuthenticator {
    config: TokenConfig,
    key_resolver: Arc<dyn KeyResolver>,
}

impl TokenAuthenticator {
    /// Create an authenticator over an explicit key resolver.
    pub fn new(config: TokenConfig, key_resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            config: config.normalized(),
            key_resolver,
        }
    }

    /// Create an authenticator backed by a caching [`JwksClient`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or has no JWKS URL.
    pub fn from_config(config: TokenConfig) -> Result<Self, ConfigError> {
        let config = config.normalized();
        config.validate()?;

        let jwks_url = config
            .jwks_url
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("OAUTH_JWKS_URL".to_string()))?;

        let jwks_client = JwksClient::new(
            jwks_url,
            config.jwks_cache_ttl(),
            config.jwks_fetch_timeout(),
            config.jwks_min_refresh_interval(),
        );

        Ok(Self::new(config, Arc::new(jwks_client)))
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Authenticate a bearer token.
    ///
    /// Returns `None` for every failure, whatever the cause. Callers gate on
    /// [`TokenConfig::enabled`] before calling.
    #[instrument(skip_all, name = "device_auth.authenticate")]
    pub async fn authenticate(&self, token: &str) -> Option<AuthenticatedDevice> {
        match self.verify(token).await {
            Ok(device) => {
                tracing::debug!(target: "device_auth.jwt", device_id = %device.device_id, "Token authenticated");
                metrics::record_authentication(None);
                Some(device)
            }
            Err(e) => {
                let category = e.category();
                if category == FailureCategory::Unexpected {
                    tracing::warn!(target: "device_auth.jwt", error = %e, "Unexpected token authentication failure");
                } else {
                    tracing::debug!(
                        target: "device_auth.jwt",
                        error = %e,
                        category = category.as_str(),
                        "Token rejected"
                    );
                }
                metrics::record_authentication(Some(category));
                None
            }
        }
    }

    pub(crate) async fn verify(&self, token: &str) -> Result<AuthenticatedDevice, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let decoded = parse_unverified(token)?;

        // Re-checked per call so a misconfigured deployment rejects everything.
        if !self.config.algorithm_supported() {
            tracing::warn!(
                target: "device_auth.jwt",
                algorithm = %self.config.algorithm,
                expected = DEFAULT_ALGORITHM,
                "Unsupported token algorithm configured"
            );
            return Err(AuthError::UnsupportedAlgorithm(self.config.algorithm.clone()));
        }

        let kid = decoded.key_id.ok_or(AuthError::MissingKid)?;

        if decoded.algorithm != ACCEPTED_ALGORITHM {
            return Err(AuthError::AlgorithmMismatch);
        }

        let jwk = self.key_resolver.resolve(&kid).await?;
        let key = rsa_decoding_key(&jwk)?;

        let settings = VerifierSettings {
            algorithm: ACCEPTED_ALGORITHM,
            key: &key,
            leeway_seconds: self.config.clock_skew_seconds,
            issuer: self.config.issuer.as_deref(),
            audience: self.config.audience.as_deref(),
        };

        let claims = verify_signature(token, &settings)?;
        identity_from_claims(&claims)
    }
}

fn identity_from_claims(claims: &DeviceClaims) -> Result<AuthenticatedDevice, AuthError> {
    let account_identifier = claims.account_identifier()?;
    let device_id = claims.device_id()?;
    let primary_device_last_seen = claims.primary_device_last_seen(Utc::now())?;

    Ok(AuthenticatedDevice::new(
        account_identifier,
        device_id,
        primary_device_last_seen,
    ))
}

/// Build an RS256 verification key from a JWK.
///
/// A JWK of another type, or declaring another algorithm or use, is the
/// wrong key type. Missing or undecodable RSA components are malformed key
/// material and count as an unavailable key.
fn rsa_decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    if jwk.kty != RSA_KEY_TYPE {
        tracing::warn!(target: "device_auth.jwt", kty = %jwk.kty, "Unexpected JWK key type");
        return Err(AuthError::WrongKeyType(jwk.kty.clone()));
    }
    if let Some(alg) = &jwk.alg {
        if alg != DEFAULT_ALGORITHM {
            tracing::warn!(target: "device_auth.jwt", alg = %alg, "Unexpected JWK algorithm");
            return Err(AuthError::WrongKeyType(alg.clone()));
        }
    }
    if let Some(key_use) = &jwk.key_use {
        if key_use != SIGNATURE_KEY_USE {
            tracing::warn!(target: "device_auth.jwt", key_use = %key_use, "Unexpected JWK use");
            return Err(AuthError::WrongKeyType(key_use.clone()));
        }
    }

    let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
        tracing::error!(target: "device_auth.jwt", kid = ?jwk.kid, "JWK missing RSA components");
        return Err(KeyUnavailable.into());
    };

    DecodingKey::from_rsa_components(n, e).map_err(|err| {
        tracing::error!(target: "device_auth.jwt", error = %err, "Invalid RSA public key encoding");
        AuthError::from(KeyUnavailable)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::StaticKeyResolver;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver that counts calls and never finds a key.
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyResolver for CountingResolver {
        async fn resolve(&self, _kid: &str) -> Result<Jwk, KeyUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(KeyUnavailable)
        }
    }

    fn rsa_jwk() -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some("test-key".to_string()),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: Some(URL_SAFE_NO_PAD.encode([0xc1u8; 256])),
            e: Some("AQAB".to_string()),
        }
    }

    fn unsigned_token(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    fn authenticator(config: TokenConfig) -> (TokenAuthenticator, Arc<CountingResolver>) {
        let resolver = Arc::new(CountingResolver::default());
        (TokenAuthenticator::new(config, resolver.clone()), resolver)
    }

    #[tokio::test]
    async fn test_blank_token_skips_resolver() {
        let (auth, resolver) = authenticator(TokenConfig::default());

        for token in ["", "   ", "\t\n"] {
            assert!(matches!(auth.verify(token).await, Err(AuthError::EmptyToken)));
            assert!(auth.authenticate(token).await.is_none());
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_token_skips_resolver() {
        let (auth, resolver) = authenticator(TokenConfig::default());

        assert!(matches!(
            auth.verify("garbage").await,
            Err(AuthError::MalformedToken)
        ));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_configured_algorithm_short_circuits() {
        let config = TokenConfig {
            algorithm: "ES256".to_string(),
            ..TokenConfig::default()
        };
        let (auth, resolver) = authenticator(config);
        let token = unsigned_token(r#"{"alg":"RS256","kid":"test-key"}"#, "{}");

        let result = auth.verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(a)) if a == "ES256"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_configured_algorithm_is_normalized() {
        let config = TokenConfig {
            algorithm: String::new(),
            ..TokenConfig::default()
        };
        let (auth, resolver) = authenticator(config);
        assert_eq!(auth.config().algorithm, "RS256");

        let token = unsigned_token(r#"{"alg":"RS256","kid":"test-key"}"#, "{}");
        assert!(matches!(
            auth.verify(&token).await,
            Err(AuthError::KeyUnavailable(_))
        ));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_kid_skips_resolver() {
        let (auth, resolver) = authenticator(TokenConfig::default());
        let token = unsigned_token(r#"{"alg":"RS256"}"#, "{}");

        assert!(matches!(auth.verify(&token).await, Err(AuthError::MissingKid)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_header_algorithm_mismatch_skips_resolver() {
        let (auth, resolver) = authenticator(TokenConfig::default());
        let token = unsigned_token(r#"{"alg":"HS256","kid":"test-key"}"#, "{}");

        assert!(matches!(
            auth.verify(&token).await,
            Err(AuthError::AlgorithmMismatch)
        ));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_key_resolution_failure() {
        let auth = TokenAuthenticator::new(
            TokenConfig::default(),
            Arc::new(StaticKeyResolver::new(vec![rsa_jwk()])),
        );
        let token = unsigned_token(r#"{"alg":"RS256","kid":"other-key"}"#, "{}");

        let err = auth.verify(&token).await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::KeyResolution);
    }

    #[tokio::test]
    async fn test_bad_signature_is_cryptographic_rejection() {
        let auth = TokenAuthenticator::new(
            TokenConfig::default(),
            Arc::new(StaticKeyResolver::new(vec![rsa_jwk()])),
        );
        let token = unsigned_token(
            r#"{"alg":"RS256","kid":"test-key"}"#,
            r#"{"sub":"3fa85f64-5717-4562-b3fc-2c963f66afa6","device_id":1,"exp":9999999999}"#,
        );

        let err = auth.verify(&token).await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::CryptographicRejection);
        assert!(auth.authenticate(&token).await.is_none());
    }

    #[test]
    fn test_rsa_decoding_key_accepts_rsa_jwk() {
        assert!(rsa_decoding_key(&rsa_jwk()).is_ok());

        let without_optional = Jwk {
            alg: None,
            key_use: None,
            ..rsa_jwk()
        };
        assert!(rsa_decoding_key(&without_optional).is_ok());
    }

    #[test]
    fn test_rsa_decoding_key_rejects_wrong_key_type() {
        let ec = Jwk {
            kty: "EC".to_string(),
            ..rsa_jwk()
        };
        assert!(matches!(rsa_decoding_key(&ec), Err(AuthError::WrongKeyType(k)) if k == "EC"));

        let wrong_alg = Jwk {
            alg: Some("RS512".to_string()),
            ..rsa_jwk()
        };
        assert!(matches!(
            rsa_decoding_key(&wrong_alg),
            Err(AuthError::WrongKeyType(_))
        ));

        let encryption_key = Jwk {
            key_use: Some("enc".to_string()),
            ..rsa_jwk()
        };
        assert!(matches!(
            rsa_decoding_key(&encryption_key),
            Err(AuthError::WrongKeyType(_))
        ));
    }

    #[test]
    fn test_rsa_decoding_key_rejects_malformed_material() {
        let missing_modulus = Jwk {
            n: None,
            ..rsa_jwk()
        };
        assert!(matches!(
            rsa_decoding_key(&missing_modulus),
            Err(AuthError::KeyUnavailable(_))
        ));

        let bad_encoding = Jwk {
            n: Some("!!!not-base64url!!!".to_string()),
            ..rsa_jwk()
        };
        assert!(matches!(
            rsa_decoding_key(&bad_encoding),
            Err(AuthError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn test_identity_from_claims_rejects_out_of_range_device() {
        let claims: DeviceClaims = serde_json::from_value(serde_json::json!({
            "sub": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "device_id": 128
        }))
        .unwrap();

        assert!(matches!(
            identity_from_claims(&claims),
            Err(AuthError::InvalidClaim(_))
        ));
    }
}
