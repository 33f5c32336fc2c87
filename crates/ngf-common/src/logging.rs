use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable controlling log verbosity.
pub const LOG_ENV: &str = "NGF_LOG";

/// Initialize structured logging with environment filter.
/// Set NGF_LOG=debug (or trace, info, warn, error) for verbosity control.
pub fn init_logging() {
    fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Like [`init_logging`], but tolerates a subscriber that is already installed.
/// Test binaries call this from every test.
pub fn try_init_logging() {
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_thread_ids(true)
        .with_test_writer()
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}
