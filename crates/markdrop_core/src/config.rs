//! Engine configuration.
//!
//! # Responsibility
//! - Define tunables for gesture capture, debouncing, store calls and retries.
//! - Load them from JSON and validate them before the engine starts.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - Timeouts, windows and attempt caps are strictly positive after validation.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

const DEFAULT_DRAG_THRESHOLD_PX: f64 = 4.0;
const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CLAIM_WINDOW_MS: u64 = 500;
const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 250;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Backoff between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackoffConfig {
    Fixed { delay_ms: u64 },
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Bounded retry settings used by error recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pointer travel (px) that turns an armed press into a drag.
    pub drag_threshold_px: f64,
    /// Sessions older than this are cancelled.
    pub session_timeout_ms: u64,
    /// Native and pointer claims this close together belong to one gesture.
    pub claim_window_ms: u64,
    /// Minimum spacing between two accepted operations.
    pub debounce_window_ms: u64,
    /// Upper bound for every store call.
    pub store_timeout_ms: u64,
    pub retry: RetryConfig,
    /// Additional folder ids treated as protected.
    pub extra_protected_ids: Vec<String>,
    /// Additional folder titles treated as protected (case-insensitive).
    pub extra_protected_titles: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            claim_window_ms: DEFAULT_CLAIM_WINDOW_MS,
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            retry: RetryConfig::default(),
            extra_protected_ids: Vec::new(),
            extra_protected_titles: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.drag_threshold_px.is_finite() || self.drag_threshold_px < 0.0 {
            return Err(ConfigError::Invalid {
                field: "drag_threshold_px",
                reason: "must be a finite, non-negative number".to_string(),
            });
        }
        for (field, value) in [
            ("session_timeout_ms", self.session_timeout_ms),
            ("claim_window_ms", self.claim_window_ms),
            ("debounce_window_ms", self.debounce_window_ms),
            ("store_timeout_ms", self.store_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must allow at least one attempt".to_string(),
            });
        }
        if let BackoffConfig::Exponential { initial_ms, max_ms } = self.retry.backoff {
            if initial_ms > max_ms {
                return Err(ConfigError::Invalid {
                    field: "retry.backoff",
                    reason: format!("initial_ms {initial_ms} exceeds max_ms {max_ms}"),
                });
            }
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn claim_window(&self) -> Duration {
        Duration::from_millis(self.claim_window_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read config `{path}`: {source}"),
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid { field, reason } => write!(f, "invalid config `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackoffConfig, ConfigError, EngineConfig};
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.debounce_window().as_millis(), 250);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.claim_window().as_millis(), 500);
    }

    #[test]
    fn parses_partial_overrides() {
        let config = EngineConfig::from_json_str(
            r#"{
                "store_timeout_ms": 1200,
                "retry": { "backoff": { "kind": "exponential", "initial_ms": 50, "max_ms": 400 } },
                "extra_protected_titles": ["Read Later"]
            }"#,
        )
        .expect("overrides parse");
        assert_eq!(config.store_timeout().as_millis(), 1200);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(
            config.retry.backoff,
            BackoffConfig::Exponential {
                initial_ms: 50,
                max_ms: 400
            }
        );
        assert_eq!(config.extra_protected_titles, vec!["Read Later".to_string()]);
    }

    #[test]
    fn rejects_zero_windows_and_attempts() {
        let err = EngineConfig::from_json_str(r#"{ "debounce_window_ms": 0 }"#)
            .expect_err("zero window must fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "debounce_window_ms",
                ..
            }
        ));

        let err = EngineConfig::from_json_str(r#"{ "retry": { "max_attempts": 0 } }"#)
            .expect_err("zero attempts must fail");
        assert!(err.to_string().contains("retry.max_attempts"));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EngineConfig::from_json_str("{ not json").expect_err("parse error");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "drag_threshold_px": 8.5 }}"#).expect("write config");
        let config = EngineConfig::from_path(file.path()).expect("load from file");
        assert_eq!(config.drag_threshold_px, 8.5);

        let missing = EngineConfig::from_path("/definitely/not/here.json")
            .expect_err("missing file must fail");
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
