//! Integration tests for configuration parsing
//!
//! Checks that documented configuration files parse, and that the
//! `[exchange]` table maps onto the driver's exchange settings.

use std::time::Duration;
use usbio::ExchangeSettings;

const MINIMAL_CONFIG: &str = r#"
[logging]
log_level = "info"
"#;

const FULL_CONFIG: &str = r#"
[device]
reset_on_init = true
reset_on_close = false

[exchange]
write_timeout_ms = 500
read_timeout_ms = 50
response_attempts = 40
retry_delay_ms = 2

[logging]
log_level = "debug"
"#;

#[test]
fn test_parse_minimal_config() {
    let config: toml::Value = toml::from_str(MINIMAL_CONFIG).unwrap();

    let logging = config.get("logging").unwrap();
    assert_eq!(logging.get("log_level").unwrap().as_str().unwrap(), "info");
    assert!(config.get("device").is_none());
    assert!(config.get("exchange").is_none());
}

#[test]
fn test_parse_full_config() {
    let config: toml::Value = toml::from_str(FULL_CONFIG).unwrap();

    let device = config.get("device").unwrap();
    assert!(device.get("reset_on_init").unwrap().as_bool().unwrap());
    assert!(!device.get("reset_on_close").unwrap().as_bool().unwrap());

    let logging = config.get("logging").unwrap();
    assert_eq!(logging.get("log_level").unwrap().as_str().unwrap(), "debug");
}

#[test]
fn test_exchange_table_maps_to_settings() {
    let config: toml::Value = toml::from_str(FULL_CONFIG).unwrap();
    let exchange: ExchangeSettings = config.get("exchange").unwrap().clone().try_into().unwrap();

    assert_eq!(exchange.write_timeout(), Duration::from_millis(500));
    assert_eq!(exchange.read_timeout(), Duration::from_millis(50));
    assert_eq!(exchange.response_attempts, 40);
    assert_eq!(exchange.retry_delay(), Duration::from_millis(2));
}

#[test]
fn test_partial_exchange_table_keeps_protocol_defaults() {
    let exchange: ExchangeSettings = toml::from_str("read_timeout_ms = 250").unwrap();

    assert_eq!(exchange.read_timeout(), Duration::from_millis(250));
    assert_eq!(exchange.write_timeout(), Duration::from_millis(1000));
    assert_eq!(exchange.response_attempts, 20);
    assert_eq!(exchange.retry_delay(), Duration::from_millis(1));
}

#[test]
fn test_invalid_toml_rejected() {
    assert!(toml::from_str::<toml::Value>("[exchange\nresponse_attempts = ").is_err());
    assert!(toml::from_str::<ExchangeSettings>("response_attempts = \"many\"").is_err());
}
