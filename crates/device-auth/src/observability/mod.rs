//! Observability for device authentication.
//!
//! Provides metrics definitions and the logging setup used by the binary.

pub mod logging;
pub mod metrics;
