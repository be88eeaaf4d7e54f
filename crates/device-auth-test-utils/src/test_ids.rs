//! Fixed test IDs for deterministic tests
//!
//! Using fixed values prevents flaky tests caused by random data.

use uuid::{uuid, Uuid};

// Accounts
pub const TEST_ACCOUNT_ID: Uuid = uuid!("3fa85f64-5717-4562-b3fc-2c963f66afa6");
pub const TEST_ACCOUNT_ID_2: Uuid = Uuid::from_u128(2);

// Identity provider
pub const TEST_ISSUER: &str = "https://idp.example";
pub const TEST_AUDIENCE: &str = "signal-service";
pub const TEST_OTHER_AUDIENCE: &str = "other-service";

// Signing key IDs
pub const TEST_KEY_ID_PRIMARY: &str = "test-key-2025-01";
pub const TEST_KEY_ID_SECONDARY: &str = "test-key-2025-02";

// Primary device last seen, 2023-11-14T22:13:20Z
pub const TEST_LAST_SEEN_EPOCH_SECONDS: i64 = 1_700_000_000;
