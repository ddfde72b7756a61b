use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::study_plan::UnknownActionPolicy;

const DEFAULT_REFERENCE_DIR: &str = "data/reference";
const DEFAULT_MEMORY_THRESHOLD: f64 = 0.85;
const DEFAULT_MEMORY_SCAN_LIMIT: usize = 2000;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub evaluation: EvaluationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            evaluation: EvaluationSettings::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the study plan workflow: reference data, case memory, and sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSettings {
    pub reference_dir: PathBuf,
    /// JSONL case log; `None` keeps decisions in process memory only.
    pub memory_log: Option<PathBuf>,
    pub memory_threshold: f64,
    pub memory_scan_limit: usize,
    /// Directory for file-backed checkpoints; `None` selects the in-memory store.
    pub checkpoint_dir: Option<PathBuf>,
    pub session_ttl: Option<Duration>,
    pub unknown_action: UnknownActionPolicy,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from(DEFAULT_REFERENCE_DIR),
            memory_log: None,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            memory_scan_limit: DEFAULT_MEMORY_SCAN_LIMIT,
            checkpoint_dir: None,
            session_ttl: None,
            unknown_action: UnknownActionPolicy::default(),
        }
    }
}

impl EvaluationSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reference_dir = optional_var("STUDY_EVAL_REFERENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.reference_dir);
        let memory_log = optional_var("STUDY_EVAL_MEMORY_LOG").map(PathBuf::from);
        let checkpoint_dir = optional_var("STUDY_EVAL_CHECKPOINT_DIR").map(PathBuf::from);

        let memory_threshold = match optional_var("STUDY_EVAL_MEMORY_THRESHOLD") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|value| (0.0..=1.0).contains(value))
                .ok_or(ConfigError::InvalidMemoryThreshold)?,
            None => defaults.memory_threshold,
        };

        let memory_scan_limit = match optional_var("STUDY_EVAL_MEMORY_SCAN_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidScanLimit)?,
            None => defaults.memory_scan_limit,
        };

        let session_ttl = match optional_var("STUDY_EVAL_SESSION_TTL_SECS") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse::<u64>()
                    .map_err(|_| ConfigError::InvalidSessionTtl)?,
            )),
            None => None,
        };

        let unknown_action = match optional_var("STUDY_EVAL_UNKNOWN_ACTION") {
            Some(raw) => UnknownActionPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidUnknownActionPolicy { value: raw })?,
            None => defaults.unknown_action,
        };

        Ok(Self {
            reference_dir,
            memory_log,
            memory_threshold,
            memory_scan_limit,
            checkpoint_dir,
            session_ttl,
            unknown_action,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidMemoryThreshold,
    InvalidScanLimit,
    InvalidSessionTtl,
    InvalidUnknownActionPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidMemoryThreshold => {
                write!(f, "STUDY_EVAL_MEMORY_THRESHOLD must be a number between 0 and 1")
            }
            ConfigError::InvalidScanLimit => {
                write!(f, "STUDY_EVAL_MEMORY_SCAN_LIMIT must be a positive integer")
            }
            ConfigError::InvalidSessionTtl => {
                write!(f, "STUDY_EVAL_SESSION_TTL_SECS must be a whole number of seconds")
            }
            ConfigError::InvalidUnknownActionPolicy { value } => write!(
                f,
                "STUDY_EVAL_UNKNOWN_ACTION must be 'reject' or 'approve' (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "STUDY_EVAL_REFERENCE_DIR",
            "STUDY_EVAL_MEMORY_LOG",
            "STUDY_EVAL_MEMORY_THRESHOLD",
            "STUDY_EVAL_MEMORY_SCAN_LIMIT",
            "STUDY_EVAL_CHECKPOINT_DIR",
            "STUDY_EVAL_SESSION_TTL_SECS",
            "STUDY_EVAL_UNKNOWN_ACTION",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.evaluation, EvaluationSettings::default());
        assert_eq!(config.evaluation.memory_scan_limit, 2000);
        assert_eq!(
            config.evaluation.unknown_action,
            UnknownActionPolicy::FailClosed
        );
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_workflow_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STUDY_EVAL_MEMORY_LOG", "/tmp/cases.jsonl");
        env::set_var("STUDY_EVAL_MEMORY_THRESHOLD", "0.9");
        env::set_var("STUDY_EVAL_SESSION_TTL_SECS", "600");
        env::set_var("STUDY_EVAL_UNKNOWN_ACTION", "approve");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        let evaluation = config.evaluation;
        assert_eq!(evaluation.memory_log, Some(PathBuf::from("/tmp/cases.jsonl")));
        assert_eq!(evaluation.memory_threshold, 0.9);
        assert_eq!(evaluation.session_ttl, Some(Duration::from_secs(600)));
        assert_eq!(evaluation.unknown_action, UnknownActionPolicy::Approve);
        assert!(evaluation.checkpoint_dir.is_none());
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STUDY_EVAL_MEMORY_THRESHOLD", "1.5");
        let result = AppConfig::load();
        reset_env();

        assert!(matches!(result, Err(ConfigError::InvalidMemoryThreshold)));
    }

    #[test]
    fn rejects_unknown_action_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STUDY_EVAL_UNKNOWN_ACTION", "maybe");
        let result = AppConfig::load();
        reset_env();

        match result {
            Err(ConfigError::InvalidUnknownActionPolicy { value }) => assert_eq!(value, "maybe"),
            other => panic!("expected policy error, got {other:?}"),
        }
    }
}
