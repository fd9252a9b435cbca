//! # Configuration snapshot.
//!
//! [`Settings`] is the immutable bag of string settings shared by the supervisor,
//! the tunnel factory and the worker factory. It is assembled once at startup:
//!
//! ```text
//! Settings::with_defaults()
//!     └─► load_file(--config)        (TOML, optional)
//!           └─► apply_override(...)  (command line)
//!                 └─► Arc<Settings>  (read-only from here on)
//! ```
//!
//! Values are kept as strings. Numeric settings are parsed by their consumers,
//! which fail fast: [`SupervisorConfig::from_settings`] rejects non-numeric or
//! out-of-range `max_failure` / `respawn_delay` before the loop starts.
//!
//! ## File format
//! Keys may live at the root of the file or under a `[shipvisor]` table (the
//! table wins on conflicts). Scalars of any TOML type are accepted; arrays of
//! scalars are joined with spaces.
//! ```toml
//! [shipvisor]
//! max_failure = 5
//! respawn_delay = "2"
//! transport = "redis"
//! worker_command = "tail-shipper --transport redis"
//! ssh_options = ["-o", "StrictHostKeyChecking=no"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::BackoffState;

/// Cap on consecutive transport failures counted for backoff.
pub const MAX_FAILURE: &str = "max_failure";
/// Base of the exponential respawn delay, in seconds.
pub const RESPAWN_DELAY: &str = "respawn_delay";
/// Transport name handed to the worker.
pub const TRANSPORT: &str = "transport";

const DEFAULTS: &[(&str, &str)] = &[
    (MAX_FAILURE, "7"),
    (RESPAWN_DELAY, "3"),
    (TRANSPORT, "stdout"),
    ("transport_exit_code", "75"),
    ("ssh_startup_grace_ms", "1000"),
    ("tunnel_probe_timeout_ms", "2000"),
];

/// Immutable, string-valued configuration snapshot.
///
/// Empty values are treated as absent by [`Settings::get`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    shipvisor: Option<toml::Table>,
    #[serde(flatten)]
    root: toml::Table,
}

impl Settings {
    /// Creates an empty snapshot (no defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot pre-filled with the built-in defaults.
    pub fn with_defaults() -> Self {
        DEFAULTS.iter().copied().collect()
    }

    /// Returns the value of `key`, or `None` if unset or empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns `true` when `key` has a non-empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Parses `key` as an unsigned integer.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn parse_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
        }
    }

    /// Parses `key` as an unsigned integer that must be present and `>= min`.
    pub fn require_u64(&self, key: &str, min: u64) -> Result<u64, ConfigError> {
        let value = self.parse_u64(key)?.ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })?;
        if value < min {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value,
                min,
            });
        }
        Ok(value)
    }

    /// Merges the settings found in a TOML file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        self.merge_toml(&text, &display)
    }

    /// Merges settings from TOML text; `origin` names the source in errors.
    pub fn merge_toml(&mut self, text: &str, origin: &str) -> Result<(), ConfigError> {
        let parsed: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.message().to_string(),
        })?;

        let mut merged = BTreeMap::new();
        for (key, value) in parsed.root {
            merged.insert(key.clone(), scalar_to_string(&key, value, origin)?);
        }
        for (key, value) in parsed.shipvisor.unwrap_or_default() {
            merged.insert(key.clone(), scalar_to_string(&key, value, origin)?);
        }
        self.values.extend(merged);
        Ok(())
    }

    /// Applies a `key=value` override (command line `--set`).
    pub fn apply_override(&mut self, raw: &str) -> Result<(), ConfigError> {
        let (key, value) = raw
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MalformedOverride {
                raw: raw.to_string(),
            })?;
        self.set(key.trim(), value.trim());
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn scalar_to_string(key: &str, value: toml::Value, origin: &str) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(|item| match item {
                    toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::Parse {
                        path: origin.to_string(),
                        reason: format!("`{key}` must be an array of scalars"),
                    }),
                    other => scalar_to_string(key, other, origin),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(" "))
        }
        toml::Value::Table(_) => Err(ConfigError::Parse {
            path: origin.to_string(),
            reason: format!("`{key}` must be a scalar, found a table"),
        }),
    }
}

/// Settings consumed by the supervisor loop itself.
///
/// ## Field semantics
/// - `max_failure`: cap on counted consecutive failures (`>= 1`)
/// - `respawn_delay`: base of `respawn_delay ^ failure_count` seconds (`>= 1`)
/// - `transport`: name used in transport failure reports
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Cap on counted consecutive transport failures.
    pub max_failure: u32,
    /// Base delay, in seconds.
    pub respawn_delay: u64,
    /// Configured transport name.
    pub transport: String,
}

impl SupervisorConfig {
    /// Parses and validates the supervisor settings.
    ///
    /// # Example
    /// ```
    /// use shipvisor::{Settings, SupervisorConfig};
    ///
    /// let settings: Settings = [("max_failure", "5"), ("respawn_delay", "2")]
    ///     .into_iter()
    ///     .collect();
    /// let cfg = SupervisorConfig::from_settings(&settings).unwrap();
    /// assert_eq!(cfg.max_failure, 5);
    /// assert_eq!(cfg.respawn_delay, 2);
    ///
    /// let bad: Settings = [("max_failure", "five"), ("respawn_delay", "2")]
    ///     .into_iter()
    ///     .collect();
    /// assert!(SupervisorConfig::from_settings(&bad).is_err());
    /// ```
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let max_failure = settings.require_u64(MAX_FAILURE, 1)?;
        let max_failure = u32::try_from(max_failure).map_err(|_| ConfigError::InvalidNumber {
            key: MAX_FAILURE.to_string(),
            value: max_failure.to_string(),
        })?;
        let respawn_delay = settings.require_u64(RESPAWN_DELAY, 1)?;
        let transport = settings.get(TRANSPORT).unwrap_or("stdout").to_string();

        Ok(Self {
            max_failure,
            respawn_delay,
            transport,
        })
    }

    /// Returns a fresh backoff state (`failure_count = 0`).
    #[inline]
    pub fn backoff(&self) -> BackoffState {
        BackoffState::new(self.max_failure, self.respawn_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SupervisorConfig::from_settings(&Settings::with_defaults()).unwrap();
        assert_eq!(cfg.max_failure, 7);
        assert_eq!(cfg.respawn_delay, 3);
        assert_eq!(cfg.transport, "stdout");
    }

    #[test]
    fn non_numeric_values_fail_fast() {
        let mut s = Settings::with_defaults();
        s.set(RESPAWN_DELAY, "3s");
        let err = SupervisorConfig::from_settings(&s).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { ref key, .. } if key == RESPAWN_DELAY));
    }

    #[test]
    fn zero_values_are_out_of_range() {
        let mut s = Settings::with_defaults();
        s.set(MAX_FAILURE, "0");
        let err = SupervisorConfig::from_settings(&s).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { value: 0, min: 1, .. }));

        let mut s = Settings::with_defaults();
        s.set(RESPAWN_DELAY, "0");
        assert!(SupervisorConfig::from_settings(&s).is_err());
    }

    #[test]
    fn missing_values_are_reported() {
        let s: Settings = [(MAX_FAILURE, "3")].into_iter().collect();
        let err = SupervisorConfig::from_settings(&s).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == RESPAWN_DELAY));
    }

    #[test]
    fn empty_values_read_as_absent() {
        let mut s = Settings::new();
        s.set("ssh_tunnel", "  ");
        assert_eq!(s.get("ssh_tunnel"), None);
        assert!(!s.contains("ssh_tunnel"));
    }

    #[test]
    fn toml_section_overrides_root() {
        let mut s = Settings::with_defaults();
        s.merge_toml(
            r#"
            max_failure = 2
            transport = "zmq"

            [shipvisor]
            max_failure = "4"
            ssh_options = ["-o", "StrictHostKeyChecking=no"]
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(s.get(MAX_FAILURE), Some("4"));
        assert_eq!(s.get(TRANSPORT), Some("zmq"));
        assert_eq!(s.get("ssh_options"), Some("-o StrictHostKeyChecking=no"));
        assert_eq!(s.get(RESPAWN_DELAY), Some("3"));
    }

    #[test]
    fn toml_nested_tables_are_rejected() {
        let mut s = Settings::new();
        let err = s.merge_toml("[other]\nkey = 1\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipvisor.toml");
        std::fs::write(&path, "respawn_delay = 9\n").unwrap();

        let mut s = Settings::with_defaults();
        s.load_file(&path).unwrap();
        assert_eq!(s.parse_u64(RESPAWN_DELAY).unwrap(), Some(9));

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            s.load_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn overrides_need_key_and_equals() {
        let mut s = Settings::new();
        s.apply_override("transport = redis").unwrap();
        assert_eq!(s.get(TRANSPORT), Some("redis"));
        assert!(s.apply_override("transport").is_err());
        assert!(s.apply_override("=redis").is_err());
    }
}
