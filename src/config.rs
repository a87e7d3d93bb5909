use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::curriculum::DEFAULT_UNLOCK_THRESHOLD;
use crate::generator::LLMConfig;
use crate::mastery::MasteryParams;
use crate::session::SessionConfig;

const DEFAULT_LEARNER: &str = "default";
const DATA_DIR_NAME: &str = "quantcoach";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: String,
    },
    #[error("alpha ({alpha}) must be greater than beta ({beta})")]
    AlphaNotAboveBeta { alpha: f64, beta: f64 },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Curriculum file; the embedded catalog when unset.
    pub catalog_path: Option<PathBuf>,
    pub learner_id: String,
    pub log_level: String,
    /// Rolling log file directory; console only when unset.
    pub log_dir: Option<PathBuf>,
    pub unlock_threshold: f64,
    pub mastery: MasteryParams,
    pub session: SessionConfig,
    pub llm: LLMConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_path: None,
            learner_id: DEFAULT_LEARNER.to_string(),
            log_level: "warn".to_string(),
            log_dir: None,
            unlock_threshold: DEFAULT_UNLOCK_THRESHOLD,
            mastery: MasteryParams::default(),
            session: SessionConfig::default(),
            llm: LLMConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.llm = LLMConfig::from_env();
        config
    }

    /// Builds a config from any key lookup; unparseable values keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(val) = get("TUTOR_DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }
        config.catalog_path = get("TUTOR_CATALOG").map(PathBuf::from);
        if let Some(val) = get("TUTOR_LEARNER") {
            config.learner_id = val;
        }
        if let Some(val) = get("RUST_LOG") {
            config.log_level = val;
        }
        let file_logs = get("ENABLE_FILE_LOGS").is_some_and(|v| v == "true" || v == "1");
        if file_logs {
            config.log_dir = Some(
                get("LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| config.data_dir.join("logs")),
            );
        }
        if let Some(val) = get("TUTOR_UNLOCK_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.unlock_threshold = val;
        }
        if let Some(val) = get("TUTOR_ALPHA").and_then(|v| v.parse().ok()) {
            config.mastery.alpha = val;
        }
        if let Some(val) = get("TUTOR_BETA").and_then(|v| v.parse().ok()) {
            config.mastery.beta = val;
        }
        if let Some(val) = get("TUTOR_MASTERED_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.mastery.mastered_threshold = val;
        }
        if let Some(val) = get("TUTOR_BASE_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            config.mastery.base_interval_secs = val;
        }
        if let Some(val) = get("TUTOR_MAX_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            config.mastery.max_interval_secs = val;
        }
        if let Some(val) = get("TUTOR_GENERATOR_ATTEMPTS").and_then(|v| v.parse().ok()) {
            config.session.generator_attempts = val;
        }
        if let Some(val) = get("TUTOR_GENERATOR_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.session.generator_timeout = Duration::from_millis(val);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mastery;
        unit_open("TUTOR_ALPHA", m.alpha)?;
        unit_open("TUTOR_BETA", m.beta)?;
        if m.alpha <= m.beta {
            return Err(ConfigError::AlphaNotAboveBeta {
                alpha: m.alpha,
                beta: m.beta,
            });
        }
        unit_closed("TUTOR_UNLOCK_THRESHOLD", self.unlock_threshold)?;
        unit_closed("TUTOR_MASTERED_THRESHOLD", m.mastered_threshold)?;
        if m.base_interval_secs <= 0 {
            return Err(out_of_range("TUTOR_BASE_INTERVAL_SECS", "(0, inf)", m.base_interval_secs));
        }
        if m.max_interval_secs < m.base_interval_secs {
            return Err(out_of_range(
                "TUTOR_MAX_INTERVAL_SECS",
                "[base interval, inf)",
                m.max_interval_secs,
            ));
        }
        if self.session.generator_attempts == 0 {
            return Err(out_of_range("TUTOR_GENERATOR_ATTEMPTS", "[1, inf)", 0));
        }
        if self.session.generator_timeout.is_zero() {
            return Err(out_of_range("TUTOR_GENERATOR_TIMEOUT_MS", "(0, inf)", 0));
        }
        if self.learner_id.trim().is_empty() {
            return Err(ConfigError::Empty("TUTOR_LEARNER"));
        }
        Ok(())
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir.join("profiles")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

fn out_of_range(name: &'static str, range: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        range,
        value: value.to_string(),
    }
}

fn unit_open(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(out_of_range(name, "(0, 1)", value))
    }
}

fn unit_closed(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(out_of_range(name, "[0, 1]", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.validate().is_ok());
        assert_eq!(config.learner_id, "default");
        assert_eq!(config.mastery.alpha, 0.25);
        assert!(config.data_dir.ends_with("quantcoach"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TUTOR_DATA_DIR", "/tmp/qc"),
            ("TUTOR_LEARNER", "alice"),
            ("TUTOR_ALPHA", "0.4"),
            ("TUTOR_GENERATOR_TIMEOUT_MS", "1500"),
            ("TUTOR_BASE_INTERVAL_SECS", "not a number"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/qc"));
        assert_eq!(config.profiles_dir(), PathBuf::from("/tmp/qc/profiles"));
        assert_eq!(config.learner_id, "alice");
        assert_eq!(config.mastery.alpha, 0.4);
        assert_eq!(config.session.generator_timeout, Duration::from_millis(1500));
        assert_eq!(config.mastery.base_interval_secs, 600);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_file_logs_default_under_data_dir() {
        let config = Config::from_lookup(lookup(&[
            ("TUTOR_DATA_DIR", "/tmp/qc"),
            ("ENABLE_FILE_LOGS", "true"),
        ]));
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/qc/logs")));

        let config = Config::from_lookup(lookup(&[("ENABLE_FILE_LOGS", "1"), ("LOG_DIR", "/var/log/qc")]));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/qc")));
    }

    #[test]
    fn test_alpha_must_exceed_beta() {
        let config = Config::from_lookup(lookup(&[("TUTOR_ALPHA", "0.1"), ("TUTOR_BETA", "0.2")]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AlphaNotAboveBeta { .. })
        ));
    }

    #[test]
    fn test_out_of_range_values() {
        let config = Config::from_lookup(lookup(&[("TUTOR_UNLOCK_THRESHOLD", "1.5")]));
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
        let config = Config::from_lookup(lookup(&[("TUTOR_GENERATOR_ATTEMPTS", "0")]));
        assert!(config.validate().is_err());
    }
}
