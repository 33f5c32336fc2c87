//! Integration test: configuration parsing
//!
//! Run with: cargo test -p ngf-core --test config_test

use ngf_core::config::BackendChoice;
use ngf_core::types::DevicePreference;
use ngf_core::{ErrorCode, NgfConfig};

#[test]
fn test_defaults() {
    ngf_common::try_init_logging();
    let config = NgfConfig::default();
    assert_eq!(config.frames.max_inflight_frames, 3);
    assert_eq!(config.memory.handle_pool_initial_size, 64);
    assert_eq!(config.fence_timeout_ns(), 1_000_000_000);
    config.validate().expect("defaults are valid");
}

#[test]
fn test_partial_file_keeps_defaults() {
    ngf_common::try_init_logging();
    let config = NgfConfig::parse(
        r#"
[device]
preference = "discrete"
backend = "vulkan"

[frames]
max_inflight_frames = 2
"#,
    )
    .expect("parse");
    assert_eq!(config.device.preference, DevicePreference::Discrete);
    assert_eq!(config.device.backend, BackendChoice::Vulkan);
    assert_eq!(config.frames.max_inflight_frames, 2);
    assert_eq!(config.frames.fence_timeout_ms, 1000);
    assert_eq!(config.vulkan.application_name, "ngf");
}

#[test]
fn test_invalid_values_are_rejected() {
    ngf_common::try_init_logging();
    let err = NgfConfig::parse("[frames]\nmax_inflight_frames = 0\n").expect_err("zero frames");
    assert_eq!(err.code(), ErrorCode::Config);
    let err = NgfConfig::parse("[device]\nbackend = \"metal\"\n").expect_err("unknown backend");
    assert_eq!(err.code(), ErrorCode::Config);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    ngf_common::try_init_logging();
    let config = NgfConfig::load_or_default("/nonexistent/ngf.toml");
    assert_eq!(config, NgfConfig::default());
}
