//! Configuration loading tests
//!
//! Tests that touch process environment variables are marked #[serial]
//! so they never run concurrently with each other.

use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;
use tunemint_common::config::TomlConfig;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
        bind_addr = "0.0.0.0:9000"
        data_dir = "/srv/tunemint"
        admin_secret = 77

        [logging]
        level = "debug"

        [credits]
        initial_credits = 5
        daily_claim_amount = 2
        claim_cooldown_hours = 12

        [rate_limit]
        window_secs = 30
        max_requests = 3

        [suno]
        api_key = "k"
        poll_interval_ms = 500
        max_poll_attempts = 4

        [chain]
        rpc_url = "http://127.0.0.1:8545"
        contract_address = "0x1111111111111111111111111111111111111111"
        operator_address = "0x2222222222222222222222222222222222222222"
        "#,
    );

    let config = TomlConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.bind_addr, "0.0.0.0:9000");
    assert_eq!(config.resolve_data_dir().to_str(), Some("/srv/tunemint"));
    assert_eq!(config.admin_secret, 77);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.credits.initial_credits, 5);
    assert_eq!(config.rate_limit.max_requests, 3);
    assert_eq!(config.suno.max_poll_attempts, 4);
    assert!(config.chain.is_enabled());
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_data_dir_used_when_unset() {
    let config = TomlConfig::default();
    let dir = config.resolve_data_dir();
    assert!(dir.ends_with("tunemint") || dir.ends_with("tunemint_data"));
}

#[test]
#[serial]
fn test_process_env_overrides_file() {
    let file = write_config(
        r#"
        [suno]
        base_url = "https://from-file.example"
        "#,
    );

    env::set_var("SUNO_API_BASE_URL", "https://from-env.example");
    env::set_var("TUNEMINT_BIND_ADDR", "127.0.0.1:6000");

    let mut config = TomlConfig::load(Some(file.path())).unwrap();
    config.apply_env().unwrap();

    env::remove_var("SUNO_API_BASE_URL");
    env::remove_var("TUNEMINT_BIND_ADDR");

    assert_eq!(config.suno.base_url, "https://from-env.example");
    assert_eq!(config.bind_addr, "127.0.0.1:6000");
}

#[test]
#[serial]
fn test_env_without_variables_changes_nothing() {
    for key in [
        "TUNEMINT_BIND_ADDR",
        "TUNEMINT_DATA_DIR",
        "TUNEMINT_ADMIN_SECRET",
        "SUNO_API_BASE_URL",
        "SUNO_API_KEY",
        "SUNO_CALLBACK_URL",
        "PINATA_API_URL",
        "PINATA_JWT",
        "IPFS_GATEWAY_URL",
        "PRICE_ORACLE_URL",
        "CHAIN_RPC_URL",
        "CREDIT_CONTRACT_ADDRESS",
        "OPERATOR_ADDRESS",
    ] {
        env::remove_var(key);
    }

    let mut config = TomlConfig::default();
    config.apply_env().unwrap();
    assert_eq!(config, TomlConfig::default());
}
