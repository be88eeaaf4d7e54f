//! Authenticated device identity.
//!
//! Produced only by a fully successful verification. The account identifier
//! is redacted in Debug output to keep it out of logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Device number within an account, constrained to `1..=127`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(u8);

impl DeviceId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 127;

    /// Returns `None` outside `1..=127`.
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(DeviceId)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity established by a verified bearer token.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedDevice {
    pub account_identifier: Uuid,
    pub device_id: DeviceId,
    pub primary_device_last_seen: DateTime<Utc>,
}

impl AuthenticatedDevice {
    pub fn new(
        account_identifier: Uuid,
        device_id: DeviceId,
        primary_device_last_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            account_identifier,
            device_id,
            primary_device_last_seen,
        }
    }
}

impl fmt::Debug for AuthenticatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedDevice")
            .field("account_identifier", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .field("primary_device_last_seen", &self.primary_device_last_seen)
            .finish()
    }
}
