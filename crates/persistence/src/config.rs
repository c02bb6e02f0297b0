//! Record store settings.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FORMGATE_CONNECT_TIMEOUT` | 5s | Time allowed to open a session |
//! | `FORMGATE_STATEMENT_TIMEOUT` | 30s | Server-side statement limit |
//! | `FORMGATE_OPERATION_TIMEOUT` | 60s | Deadline for a whole store operation |
//! | `FORMGATE_SQLITE_BUSY_TIMEOUT` | 5s | How long SQLite waits on a locked file |
//! | `FORMGATE_HASH_COST` | 10 | bcrypt cost factor |
//! | `FORMGATE_CREDENTIAL_FIELD` | password | Field hashed on write |
//!
//! Durations use humantime syntax (`500ms`, `30s`, `2m`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the credential field.
pub const DEFAULT_CREDENTIAL_FIELD: &str = "password";

/// Default bcrypt cost.
pub const DEFAULT_HASH_COST: u32 = 10;

/// Timeouts and credential settings shared by every store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Time allowed to open a session.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Server-side statement limit, where the engine supports one.
    #[serde(with = "humantime_serde", default = "default_statement_timeout")]
    pub statement_timeout: Duration,

    /// Deadline for a whole insert, lookup or update.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    pub operation_timeout: Duration,

    /// How long SQLite waits for a locked database file.
    #[serde(with = "humantime_serde", default = "default_sqlite_busy_timeout")]
    pub sqlite_busy_timeout: Duration,

    /// bcrypt cost factor.
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,

    /// Field whose value is hashed before it is stored.
    #[serde(default = "default_credential_field")]
    pub credential_field: String,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_statement_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_sqlite_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_hash_cost() -> u32 {
    DEFAULT_HASH_COST
}

fn default_credential_field() -> String {
    DEFAULT_CREDENTIAL_FIELD.to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            statement_timeout: default_statement_timeout(),
            operation_timeout: default_operation_timeout(),
            sqlite_busy_timeout: default_sqlite_busy_timeout(),
            hash_cost: default_hash_cost(),
            credential_field: default_credential_field(),
        }
    }
}

impl StoreSettings {
    /// Reads settings from `FORMGATE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let duration = |key: &str, default: fn() -> Duration| {
            lookup(key)
                .and_then(|v| humantime::parse_duration(v.trim()).ok())
                .unwrap_or_else(default)
        };

        Self {
            connect_timeout: duration("FORMGATE_CONNECT_TIMEOUT", default_connect_timeout),
            statement_timeout: duration("FORMGATE_STATEMENT_TIMEOUT", default_statement_timeout),
            operation_timeout: duration("FORMGATE_OPERATION_TIMEOUT", default_operation_timeout),
            sqlite_busy_timeout: duration(
                "FORMGATE_SQLITE_BUSY_TIMEOUT",
                default_sqlite_busy_timeout,
            ),
            hash_cost: lookup("FORMGATE_HASH_COST")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_hash_cost),
            credential_field: lookup("FORMGATE_CREDENTIAL_FIELD")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_credential_field),
        }
    }

    /// Sets the bcrypt cost.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Sets the operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Validates the settings and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.connect_timeout.is_zero() {
            errors.push("Connect timeout cannot be 0".to_string());
        }

        if self.statement_timeout.is_zero() {
            errors.push("Statement timeout cannot be 0".to_string());
        }

        if self.operation_timeout.is_zero() {
            errors.push("Operation timeout cannot be 0".to_string());
        }

        if !(bcrypt_cost::MIN..=bcrypt_cost::MAX).contains(&self.hash_cost) {
            errors.push(format!(
                "Hash cost must be between {} and {}",
                bcrypt_cost::MIN,
                bcrypt_cost::MAX
            ));
        }

        if self.credential_field.trim().is_empty() {
            errors.push("Credential field cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

mod bcrypt_cost {
    pub const MIN: u32 = 4;
    pub const MAX: u32 = 31;
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = StoreSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.hash_cost, 10);
        assert_eq!(settings.credential_field, "password");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FORMGATE_CONNECT_TIMEOUT", "750ms"),
            ("FORMGATE_OPERATION_TIMEOUT", "2m"),
            ("FORMGATE_HASH_COST", "12"),
            ("FORMGATE_STATEMENT_TIMEOUT", "not a duration"),
        ]);
        let settings = StoreSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.connect_timeout, Duration::from_millis(750));
        assert_eq!(settings.operation_timeout, Duration::from_secs(120));
        assert_eq!(settings.hash_cost, 12);
        assert_eq!(settings.statement_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_serde_humantime() {
        let settings: StoreSettings =
            serde_json::from_str(r#"{"connect_timeout": "2s", "hash_cost": 4}"#).unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_secs(2));
        assert_eq!(settings.hash_cost, 4);
        assert_eq!(settings.operation_timeout, Duration::from_secs(60));

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["connect_timeout"], "2s");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let settings = StoreSettings {
            connect_timeout: Duration::ZERO,
            hash_cost: 2,
            credential_field: " ".to_string(),
            ..Default::default()
        };
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
