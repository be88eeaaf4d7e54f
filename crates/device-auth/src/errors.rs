//! Internal rejection reasons for bearer-token authentication.
//!
//! None of these ever reach the caller of
//! [`TokenAuthenticator::authenticate`](crate::auth::TokenAuthenticator::authenticate):
//! every variant collapses to "no identity". They exist so that logs and
//! metrics can tell a hostile token apart from an operational problem.

use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

/// Coarse classification of an authentication failure.
///
/// Labels are bounded and safe to use as metric label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Blank token, bad structure, invalid claim types or ranges.
    MalformedInput,
    /// Unsupported configured algorithm, issuer or audience mismatch.
    PolicyRejection,
    /// Unknown key id, key source unreachable, wrong key type.
    KeyResolution,
    /// Bad signature, expired or not yet valid beyond tolerance.
    CryptographicRejection,
    /// Anything else. Logged at warn.
    Unexpected,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::MalformedInput => "malformed_input",
            FailureCategory::PolicyRejection => "policy_rejection",
            FailureCategory::KeyResolution => "key_resolution",
            FailureCategory::CryptographicRejection => "cryptographic_rejection",
            FailureCategory::Unexpected => "unexpected",
        }
    }
}

/// The single failure a [`KeyResolver`](crate::auth::KeyResolver) reports.
///
/// Transport failures, unknown key ids and malformed key sets are not
/// distinguished; the resolver logs the cause itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Signing key unavailable")]
pub struct KeyUnavailable;

/// Typed claim accessor failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("claim '{0}' is missing")]
    Missing(&'static str),

    #[error("claim '{0}' has the wrong type")]
    InvalidType(&'static str),

    #[error("claim '{0}' is out of range")]
    OutOfRange(&'static str),
}

/// Why a token was rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is empty")]
    EmptyToken,

    #[error("token exceeds maximum size")]
    TokenTooLarge,

    #[error("token structure is malformed")]
    MalformedToken,

    #[error("token header has no key id")]
    MissingKid,

    #[error("configured algorithm '{0}' is not supported")]
    UnsupportedAlgorithm(String),

    #[error("token header algorithm is not accepted")]
    AlgorithmMismatch,

    #[error(transparent)]
    KeyUnavailable(#[from] KeyUnavailable),

    #[error("resolved key is not usable for the accepted algorithm: {0}")]
    WrongKeyType(String),

    #[error("token verification failed: {0:?}")]
    Verification(ErrorKind),

    #[error("token issued in the future")]
    IssuedInFuture,

    #[error("invalid claim: {0}")]
    InvalidClaim(#[from] ClaimError),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl AuthError {
    pub fn category(&self) -> FailureCategory {
        match self {
            AuthError::EmptyToken
            | AuthError::TokenTooLarge
            | AuthError::MalformedToken
            | AuthError::MissingKid
            | AuthError::InvalidClaim(_) => FailureCategory::MalformedInput,
            AuthError::UnsupportedAlgorithm(_) => FailureCategory::PolicyRejection,
            AuthError::AlgorithmMismatch | AuthError::IssuedInFuture => {
                FailureCategory::CryptographicRejection
            }
            AuthError::KeyUnavailable(_) | AuthError::WrongKeyType(_) => {
                FailureCategory::KeyResolution
            }
            AuthError::Verification(kind) => categorize_verification(kind),
            AuthError::Unexpected(_) => FailureCategory::Unexpected,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        let kind = err.into_kind();
        if categorize_verification(&kind) == FailureCategory::Unexpected {
            AuthError::Unexpected(format!("{:?}", kind))
        } else {
            AuthError::Verification(kind)
        }
    }
}

fn categorize_verification(kind: &ErrorKind) -> FailureCategory {
    match kind {
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => FailureCategory::PolicyRejection,
        ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAlgorithm => FailureCategory::CryptographicRejection,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidSubject => FailureCategory::MalformedInput,
        _ => FailureCategory::Unexpected,
    }
}
