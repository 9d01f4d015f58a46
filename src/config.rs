use crate::bridge::BridgeConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    pub connections_path: PathBuf,
    pub frontend_dist: PathBuf,
    pub bridge: BridgeConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let upload_dir = PathBuf::from(env_or("UPLOAD_DIR", "uploads"));
        let connections_path = PathBuf::from(env_or(
            "VNC_CONNECTIONS_PATH",
            "config/vnc_connections.json",
        ));
        let frontend_dist = PathBuf::from(env_or("FRONTEND_DIST", "dist"));

        let buffer_size = env_usize("BRIDGE_BUFFER_SIZE", 65536)?;
        if buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BRIDGE_BUFFER_SIZE".to_string(),
                "buffer size must be greater than zero".to_string(),
            ));
        }

        let bridge = BridgeConfig {
            default_target: env_or("VNC_DEFAULT_TARGET", "localhost:5900"),
            buffer_size,
            dial_timeout: env_duration_ms("BRIDGE_DIAL_TIMEOUT_MS", 10_000)?,
            read_timeout: env_duration_ms("BRIDGE_READ_TIMEOUT_MS", 0)?,
            write_timeout: env_duration_ms("BRIDGE_WRITE_TIMEOUT_MS", 0)?,
            heartbeat_interval: env_duration_ms("BRIDGE_HEARTBEAT_MS", 0)?,
            allow_custom_target: env_bool("ALLOW_CUSTOM_TARGET", true)?,
        };

        Ok(Self {
            bind_address,
            log_level,
            upload_dir,
            connections_path,
            frontend_dist,
            bridge,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<usize>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a number", raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Durations are given in milliseconds; zero disables the corresponding
/// deadline or interval.
fn env_duration_ms(name: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a duration in milliseconds", raw),
            )
        }),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", raw),
            )),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("RUST_LOG");
            env::remove_var("UPLOAD_DIR");
            env::remove_var("VNC_CONNECTIONS_PATH");
            env::remove_var("FRONTEND_DIST");
            env::remove_var("VNC_DEFAULT_TARGET");
            env::remove_var("BRIDGE_BUFFER_SIZE");
            env::remove_var("BRIDGE_DIAL_TIMEOUT_MS");
            env::remove_var("BRIDGE_READ_TIMEOUT_MS");
            env::remove_var("BRIDGE_WRITE_TIMEOUT_MS");
            env::remove_var("BRIDGE_HEARTBEAT_MS");
            env::remove_var("ALLOW_CUSTOM_TARGET");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(
            config.connections_path,
            PathBuf::from("config/vnc_connections.json")
        );
        assert_eq!(config.bridge.default_target, "localhost:5900");
        assert_eq!(config.bridge.buffer_size, 65536);
        assert_eq!(config.bridge.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.bridge.read_timeout, Duration::ZERO);
        assert_eq!(config.bridge.write_timeout, Duration::ZERO);
        assert_eq!(config.bridge.heartbeat_interval, Duration::ZERO);
        assert!(config.bridge.allow_custom_target);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("RUST_LOG", "debug");
            env::set_var("UPLOAD_DIR", "/srv/uploads");
            env::set_var("VNC_DEFAULT_TARGET", "10.0.0.5:5901");
            env::set_var("BRIDGE_BUFFER_SIZE", "8192");
            env::set_var("BRIDGE_DIAL_TIMEOUT_MS", "2500");
            env::set_var("BRIDGE_HEARTBEAT_MS", "30000");
            env::set_var("ALLOW_CUSTOM_TARGET", "false");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.bridge.default_target, "10.0.0.5:5901");
        assert_eq!(config.bridge.buffer_size, 8192);
        assert_eq!(config.bridge.dial_timeout, Duration::from_millis(2500));
        assert_eq!(
            config.bridge.heartbeat_interval,
            Duration::from_millis(30000)
        );
        assert!(!config.bridge.allow_custom_target);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_buffer_size() {
        clear_env_vars();
        unsafe {
            env::set_var("BRIDGE_BUFFER_SIZE", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "BRIDGE_BUFFER_SIZE");
                assert!(msg.contains("greater than zero"));
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_duration() {
        clear_env_vars();
        unsafe {
            env::set_var("BRIDGE_DIAL_TIMEOUT_MS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BRIDGE_DIAL_TIMEOUT_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bool() {
        clear_env_vars();
        unsafe {
            env::set_var("ALLOW_CUSTOM_TARGET", "maybe");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "ALLOW_CUSTOM_TARGET"),
        }
    }
}
