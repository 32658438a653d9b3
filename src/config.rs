//! Driver Configuration
//!
//! Location names for the queue driver and the log threshold, loaded from
//! JSON. Every field has a default so an empty object is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DriverError, DriverResult};
use crate::observability::{log_event, Event, Logger, Severity};

/// Queue location names, relative to the queue root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Where workers append responses (default: "responses")
    #[serde(default = "default_source")]
    pub source: String,

    /// Where jobs are pushed (default: "tasks")
    #[serde(default = "default_destination")]
    pub destination: String,
}

fn default_source() -> String {
    "responses".to_string()
}

fn default_destination() -> String {
    "tasks".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
        }
    }
}

/// Top-level driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    /// Minimum severity written by the logger (default: INFO)
    #[serde(default)]
    pub log_level: Severity,
}

impl DriverConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> DriverResult<Self> {
        let config: DriverConfig =
            serde_json::from_str(json).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn load(path: impl AsRef<Path>) -> DriverResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&contents)?;

        let path = path.display().to_string();
        log_event(
            Event::ConfigLoaded,
            &[
                ("path", path.as_str()),
                ("queue_source", config.queue.source.as_str()),
                ("queue_destination", config.queue.destination.as_str()),
            ],
        );
        Ok(config)
    }

    /// Install `log_level` as the process-wide logger threshold
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.log_level);
    }

    fn validate(&self) -> DriverResult<()> {
        for (field, value) in [
            ("queue.source", &self.queue.source),
            ("queue.destination", &self.queue.destination),
        ] {
            if value.is_empty() {
                return Err(DriverError::Config(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.queue.source, "responses");
        assert_eq!(config.queue.destination, "tasks");
        assert_eq!(config.log_level, Severity::Info);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        assert_eq!(DriverConfig::from_json_str("{}").unwrap(), DriverConfig::default());
    }

    #[test]
    fn test_partial_queue_section() {
        let config = DriverConfig::from_json_str(r#"{"queue": {"destination": "jobs"}, "log_level": "WARN"}"#)
            .unwrap();
        assert_eq!(config.queue.source, "responses");
        assert_eq!(config.queue.destination, "jobs");
        assert_eq!(config.log_level, Severity::Warn);
    }

    #[test]
    fn test_rejects_empty_location() {
        let err = DriverConfig::from_json_str(r#"{"queue": {"source": ""}}"#).unwrap_err();
        assert_eq!(err.code(), "RTDB_CONFIG_ERROR");
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            DriverConfig::from_json_str("{queue"),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"queue": {{"source": "out"}}}}"#).unwrap();

        let config = DriverConfig::load(file.path()).unwrap();
        assert_eq!(config.queue.source, "out");
        assert_eq!(config.queue.destination, "tasks");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DriverConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("absent.json")));
    }
}
