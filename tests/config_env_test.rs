//! Configuration overrides read from the environment
//!
//! Kept in its own test binary, and in a single test, because it mutates
//! process-wide environment variables.

use tessera::config::{LOG_LEVEL_ENV, REQUIRE_TLS_ENV};
use tessera::{Error, LogLevel, ManagerConfig};

#[test]
fn test_env_overrides() {
    std::env::remove_var(REQUIRE_TLS_ENV);
    std::env::remove_var(LOG_LEVEL_ENV);

    let untouched = ManagerConfig::default().with_env_overrides().unwrap();
    assert!(!untouched.require_tls);
    assert_eq!(untouched.logging.level, LogLevel::Info);

    std::env::set_var(REQUIRE_TLS_ENV, " Yes ");
    std::env::set_var(LOG_LEVEL_ENV, "DEBUG");
    let config = ManagerConfig::default().with_env_overrides().unwrap();
    assert!(config.require_tls);
    assert_eq!(config.logging.level, LogLevel::Debug);

    // An explicit false wins over a file that asked for TLS
    std::env::set_var(REQUIRE_TLS_ENV, "off");
    let relaxed = ManagerConfig {
        require_tls: true,
        ..ManagerConfig::default()
    }
    .with_env_overrides()
    .unwrap();
    assert!(!relaxed.require_tls);

    std::env::set_var(REQUIRE_TLS_ENV, "maybe");
    match ManagerConfig::default().with_env_overrides() {
        Err(Error::Config(message)) => assert!(message.contains(REQUIRE_TLS_ENV)),
        other => panic!("expected a config error, got {:?}", other),
    }

    std::env::set_var(REQUIRE_TLS_ENV, "true");
    std::env::set_var(LOG_LEVEL_ENV, "loud");
    assert!(matches!(
        ManagerConfig::default().with_env_overrides(),
        Err(Error::Config(_))
    ));

    std::env::remove_var(REQUIRE_TLS_ENV);
    std::env::remove_var(LOG_LEVEL_ENV);
}
