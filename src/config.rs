use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`LendingLedger`](crate::ledger::LendingLedger)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum number of transitions kept in the ledger's history
    pub history_capacity: usize,
    /// Whether denied borrows and returns are logged at debug level
    pub log_denials: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { history_capacity: 100, log_denials: true }
    }
}

impl LedgerConfig {
    /// Set the history capacity
    #[must_use]
    pub fn with_history_capacity(mut self, history_capacity: usize) -> Self {
        self.history_capacity = history_capacity;
        self
    }

    /// Enable or disable logging of denied transitions
    #[must_use]
    pub fn with_log_denials(mut self, log_denials: bool) -> Self {
        self.log_denials = log_denials;
        self
    }

    /// Parse a config from JSON, filling in defaults for missing fields
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the input is not valid JSON for this schema.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Parse` if its contents do not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = LedgerConfig::from_json(r#"{ "history_capacity": 5 }"#);

        assert!(matches!(config, Ok(LedgerConfig { history_capacity: 5, log_denials: true })));
        assert!(matches!(LedgerConfig::from_json("{}"), Ok(c) if c == LedgerConfig::default()));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            LedgerConfig::from_json(r#"{ "history_capacity": "lots" }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            LedgerConfig::load("/definitely/not/a/ledger-config.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
