//! Device token claims.
//!
//! Claims are deserialized loosely and read through typed accessors, so a
//! claim of the wrong JSON type is a [`ClaimError`] rather than a decode
//! failure of the whole token. The `sub` field is redacted in Debug output.

use crate::errors::ClaimError;
use crate::identity::DeviceId;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub const SUBJECT_CLAIM: &str = "sub";
pub const DEVICE_ID_CLAIM: &str = "device_id";
pub const PRIMARY_DEVICE_LAST_SEEN_CLAIM: &str = "primary_device_last_seen_epoch_seconds";
pub const ISSUED_AT_CLAIM: &str = "iat";

/// Custom claims carried by a device token.
///
/// Standard time-bound, issuer and audience claims are checked by the
/// verifier and not kept here.
#[derive(Clone, Default, Deserialize)]
pub struct DeviceClaims {
    #[serde(default)]
    sub: Option<Value>,

    #[serde(default)]
    device_id: Option<Value>,

    #[serde(default, rename = "primary_device_last_seen_epoch_seconds")]
    primary_device_last_seen: Option<Value>,

    #[serde(default)]
    iat: Option<Value>,
}

impl fmt::Debug for DeviceClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceClaims")
            .field("sub", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .field("primary_device_last_seen", &self.primary_device_last_seen)
            .field("iat", &self.iat)
            .finish()
    }
}

impl DeviceClaims {
    /// The `sub` claim as an account UUID.
    pub fn account_identifier(&self) -> Result<Uuid, ClaimError> {
        match &self.sub {
            None | Some(Value::Null) => Err(ClaimError::Missing(SUBJECT_CLAIM)),
            Some(Value::String(s)) => {
                parse_hyphenated(s).ok_or(ClaimError::InvalidType(SUBJECT_CLAIM))
            }
            Some(_) => Err(ClaimError::InvalidType(SUBJECT_CLAIM)),
        }
    }

    /// The `device_id` claim, which must be an integer in `1..=127`.
    pub fn device_id(&self) -> Result<DeviceId, ClaimError> {
        let value = match &self.device_id {
            None | Some(Value::Null) => return Err(ClaimError::Missing(DEVICE_ID_CLAIM)),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or(ClaimError::InvalidType(DEVICE_ID_CLAIM))?,
            Some(_) => return Err(ClaimError::InvalidType(DEVICE_ID_CLAIM)),
        };

        DeviceId::new(value).ok_or(ClaimError::OutOfRange(DEVICE_ID_CLAIM))
    }

    /// The `iat` claim in epoch seconds, if present.
    pub fn issued_at(&self) -> Result<Option<i64>, ClaimError> {
        match &self.iat {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or(ClaimError::InvalidType(ISSUED_AT_CLAIM)),
            Some(_) => Err(ClaimError::InvalidType(ISSUED_AT_CLAIM)),
        }
    }

    /// The primary device last-seen time.
    ///
    /// Absent or explicit `null` yields `now`; any other non-integer value is
    /// an error.
    pub fn primary_device_last_seen(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ClaimError> {
        match &self.primary_device_last_seen {
            None | Some(Value::Null) => Ok(now),
            Some(Value::Number(n)) => {
                let secs = n
                    .as_i64()
                    .ok_or(ClaimError::InvalidType(PRIMARY_DEVICE_LAST_SEEN_CLAIM))?;
                DateTime::from_timestamp(secs, 0)
                    .ok_or(ClaimError::OutOfRange(PRIMARY_DEVICE_LAST_SEEN_CLAIM))
            }
            Some(_) => Err(ClaimError::InvalidType(PRIMARY_DEVICE_LAST_SEEN_CLAIM)),
        }
    }
}

/// Only the canonical 8-4-4-4-12 form. Simple, braced and URN forms are
/// rejected.
fn parse_hyphenated(s: &str) -> Option<Uuid> {
    const HYPHENATED_LEN: usize = 36;

    if s.len() != HYPHENATED_LEN {
        return None;
    }
    Uuid::try_parse(s).ok()
}
