//! ID generation utilities for flowloop
//!
//! Run ids tag the log lines of one CLI invocation.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique run ID
///
/// Format: `run-{timestamp_ms}-{random_hex}`
/// Example: `run-1738300800123-a1b2`
pub fn generate_run_id() -> String {
    let random: u16 = rand::rng().random();
    format!("run-{}-{:04x}", now_ms(), random)
}
