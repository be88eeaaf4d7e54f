//! JWT structure parsing and signature verification.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding (DoS prevention)
//! - The unverified header is used only to pick a key and pre-screen `alg`
//! - Verification settings are an immutable value built per call

use crate::auth::claims::DeviceClaims;
use crate::config::MAX_CLOCK_SKEW_SECONDS;
use crate::errors::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Header, Validation};
use std::fmt;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Device tokens are a few hundred bytes; anything larger is rejected before
/// base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// The only signing algorithm device tokens may use.
pub const ACCEPTED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Header and structure of a token whose signature has not been checked yet.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// `alg` from the header.
    pub algorithm: Algorithm,

    /// `kid` from the header, if present and non-blank.
    pub key_id: Option<String>,
}

/// Parse a compact JWT without verifying its signature.
///
/// Checks size, three-segment structure, base64url header and payload, a
/// JSON header with a known `alg`, and a JSON object payload.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - any structural or encoding failure
pub fn parse_unverified(token: &str) -> Result<DecodedToken, AuthError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "device_auth.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(AuthError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "device_auth.jwt", "Token rejected: invalid JWT format");
        return Err(AuthError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "device_auth.jwt", error = %e, "Failed to decode JWT header base64");
        AuthError::MalformedToken
    })?;

    let header: Header = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "device_auth.jwt", error = %e, "Failed to parse JWT header JSON");
        AuthError::MalformedToken
    })?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_part).map_err(|e| {
        tracing::debug!(target: "device_auth.jwt", error = %e, "Failed to decode JWT payload base64");
        AuthError::MalformedToken
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "device_auth.jwt", error = %e, "Failed to parse JWT payload JSON");
        AuthError::MalformedToken
    })?;

    if !payload.is_object() {
        tracing::debug!(target: "device_auth.jwt", "JWT payload is not a JSON object");
        return Err(AuthError::MalformedToken);
    }

    Ok(DecodedToken {
        algorithm: header.alg,
        key_id: header.kid.filter(|kid| !kid.trim().is_empty()),
    })
}

/// Everything signature and claim verification depends on.
///
/// Built once per call from the configuration and the resolved key.
#[derive(Clone)]
pub struct VerifierSettings<'a> {
    pub algorithm: Algorithm,
    pub key: &'a DecodingKey,
    pub leeway_seconds: u64,
    pub issuer: Option<&'a str>,
    pub audience: Option<&'a str>,
}

impl fmt::Debug for VerifierSettings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierSettings")
            .field("algorithm", &self.algorithm)
            .field("key", &"[DecodingKey]")
            .field("leeway_seconds", &self.leeway_seconds)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl VerifierSettings<'_> {
    /// Leeway bounded by [`MAX_CLOCK_SKEW_SECONDS`]; the verifier subtracts it
    /// from the current time.
    fn leeway(&self) -> u64 {
        self.leeway_seconds.min(MAX_CLOCK_SKEW_SECONDS)
    }

    /// `exp` and `nbf` are checked when present but not required.
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway();
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let mut required: Vec<&str> = Vec::new();

        if let Some(issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }

        match self.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.push("aud");
            }
            // Without a configured audience any `aud` the token carries is ignored.
            None => validation.validate_aud = false,
        }

        validation.set_required_spec_claims(&required);
        validation
    }
}

/// Verify signature, time-bound claims, issuer and audience.
///
/// # Errors
///
/// Returns `AuthError::Verification` for token-caused failures,
/// `AuthError::IssuedInFuture` for an `iat` beyond the leeway, and
/// `AuthError::Unexpected` for library failures unrelated to the token.
pub fn verify_signature(
    token: &str,
    settings: &VerifierSettings<'_>,
) -> Result<DeviceClaims, AuthError> {
    let token_data = decode::<DeviceClaims>(token, settings.key, &settings.validation())?;
    check_issued_at(&token_data.claims, settings.leeway(), Utc::now().timestamp())?;
    Ok(token_data.claims)
}

/// Reject an `iat` more than `leeway_seconds` after `now`. A token without
/// `iat` passes.
fn check_issued_at(claims: &DeviceClaims, leeway_seconds: u64, now: i64) -> Result<(), AuthError> {
    let Some(iat) = claims.issued_at()? else {
        return Ok(());
    };

    let max_iat = now.saturating_add(i64::try_from(leeway_seconds).unwrap_or(i64::MAX));
    if iat > max_iat {
        tracing::debug!(
            target: "device_auth.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(AuthError::IssuedInFuture);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    fn unsigned_token(header: &str, payload: &str) -> String {
        format!("{}.{}.signature", segment(header), segment(payload))
    }

    #[test]
    fn test_parse_valid_header() {
        let token = unsigned_token(
            r#"{"alg":"RS256","typ":"JWT","kid":"test-key-01"}"#,
            r#"{"sub":"x"}"#,
        );

        let decoded = parse_unverified(&token).unwrap();
        assert_eq!(decoded.algorithm, Algorithm::RS256);
        assert_eq!(decoded.key_id.as_deref(), Some("test-key-01"));
    }

    #[test]
    fn test_parse_missing_or_blank_kid() {
        let missing = unsigned_token(r#"{"alg":"RS256"}"#, "{}");
        assert!(parse_unverified(&missing).unwrap().key_id.is_none());

        let blank = unsigned_token(r#"{"alg":"RS256","kid":"  "}"#, "{}");
        assert!(parse_unverified(&blank).unwrap().key_id.is_none());
    }

    #[test]
    fn test_parse_wrong_segment_count() {
        assert!(matches!(
            parse_unverified("not-a-jwt"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            parse_unverified("only.two"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            parse_unverified("a.b.c.d"),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_parse_invalid_base64() {
        assert!(matches!(
            parse_unverified("!!!invalid!!!.payload.signature"),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_parse_invalid_header_json() {
        let token = format!("{}.{}.sig", segment("not json"), segment("{}"));
        assert!(matches!(
            parse_unverified(&token),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_parse_unknown_algorithm() {
        let token = unsigned_token(r#"{"alg":"none","kid":"k"}"#, "{}");
        assert!(matches!(
            parse_unverified(&token),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_parse_payload_must_be_object() {
        let token = unsigned_token(r#"{"alg":"RS256","kid":"k"}"#, "[1,2,3]");
        assert!(matches!(
            parse_unverified(&token),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn test_parse_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            parse_unverified(&oversized),
            Err(AuthError::TokenTooLarge)
        ));
    }

    #[test]
    fn test_parse_at_size_limit() {
        let header = segment(r#"{"alg":"RS256","kid":"key"}"#);
        let payload = segment("{}");
        let sig_len = MAX_JWT_SIZE_BYTES - header.len() - payload.len() - 2;
        let token = format!("{}.{}.{}", header, payload, "s".repeat(sig_len));

        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert!(parse_unverified(&token).is_ok());
    }

    #[test]
    fn test_validation_without_audience_ignores_aud() {
        let key = DecodingKey::from_secret(b"unused");
        let settings = VerifierSettings {
            algorithm: Algorithm::RS256,
            key: &key,
            leeway_seconds: 60,
            issuer: None,
            audience: None,
        };

        let validation = settings.validation();
        assert!(!validation.validate_aud);
        assert_eq!(validation.leeway, 60);
        assert_eq!(validation.algorithms, vec![Algorithm::RS256]);
        assert!(validation.validate_exp);
        assert!(validation.required_spec_claims.is_empty());
    }

    #[test]
    fn test_validation_leeway_is_bounded() {
        let key = DecodingKey::from_secret(b"unused");
        let settings = VerifierSettings {
            algorithm: Algorithm::RS256,
            key: &key,
            leeway_seconds: u64::MAX,
            issuer: None,
            audience: None,
        };

        assert_eq!(settings.validation().leeway, MAX_CLOCK_SKEW_SECONDS);
    }

    fn claims_with_iat(iat: i64) -> DeviceClaims {
        serde_json::from_value(serde_json::json!({ "iat": iat })).unwrap()
    }

    #[test]
    fn test_issued_at_within_leeway() {
        let now = 1_700_000_000;

        assert!(check_issued_at(&claims_with_iat(now - 3600), 60, now).is_ok());
        assert!(check_issued_at(&claims_with_iat(now), 0, now).is_ok());
        assert!(check_issued_at(&claims_with_iat(now + 60), 60, now).is_ok());
        assert!(check_issued_at(&DeviceClaims::default(), 0, now).is_ok());
    }

    #[test]
    fn test_issued_at_beyond_leeway() {
        let now = 1_700_000_000;

        assert!(matches!(
            check_issued_at(&claims_with_iat(now + 61), 60, now),
            Err(AuthError::IssuedInFuture)
        ));
        assert!(matches!(
            check_issued_at(&claims_with_iat(i64::MAX), 600, i64::MAX - 700),
            Err(AuthError::IssuedInFuture)
        ));
        // Saturates instead of overflowing near the end of time.
        assert!(check_issued_at(&claims_with_iat(i64::MAX), 600, i64::MAX - 1).is_ok());
    }

    #[test]
    fn test_issued_at_wrong_type() {
        let claims: DeviceClaims =
            serde_json::from_value(serde_json::json!({ "iat": "soon" })).unwrap();

        assert!(matches!(
            check_issued_at(&claims, 60, 1_700_000_000),
            Err(AuthError::InvalidClaim(_))
        ));
    }

    #[test]
    fn test_validation_with_issuer_and_audience_requires_them() {
        let key = DecodingKey::from_secret(b"unused");
        let settings = VerifierSettings {
            algorithm: Algorithm::RS256,
            key: &key,
            leeway_seconds: 0,
            issuer: Some("https://idp.example"),
            audience: Some("signal-service"),
        };

        let validation = settings.validation();
        assert!(validation.validate_aud);
        assert!(validation.required_spec_claims.contains("iss"));
        assert!(validation.required_spec_claims.contains("aud"));
    }

    #[test]
    fn test_settings_debug_hides_key() {
        let key = DecodingKey::from_secret(b"unused");
        let settings = VerifierSettings {
            algorithm: Algorithm::RS256,
            key: &key,
            leeway_seconds: 0,
            issuer: None,
            audience: None,
        };

        assert!(format!("{:?}", settings).contains("[DecodingKey]"));
    }
}
