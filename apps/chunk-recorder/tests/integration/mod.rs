pub mod failure_injection;
pub mod scenarios;
pub mod shutdown;

use chunk_recorder::SessionConfig;
use std::time::Duration;

#[cfg(test)]
pub fn init_test_environment() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
pub fn create_test_config(record_seconds: u64, gap_seconds: u64) -> SessionConfig {
    SessionConfig::new(
        "/tmp/rec",
        Duration::from_secs(record_seconds),
        Duration::from_secs(gap_seconds),
    )
}
