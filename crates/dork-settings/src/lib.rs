//! Layered settings store.
//!
//! Precedence, lowest to highest: compiled-in defaults, `$DORK_HOME/config.json`,
//! process environment variables (`DORK_<KEY>`). Every resolved value records
//! which layer it came from so callers (the `config` CLI surface in
//! particular) can annotate output with its [`Origin`].
//!
//! `config.json` writes go through a scratch-file-then-rename commit point,
//! the same pattern the relay maildir uses for envelope delivery: a crash
//! mid-write leaves at most a stray temp file, never a half-written config.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::PathBuf;

use dork_core::SettingsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a schema entry's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaValueType {
    /// Arbitrary UTF-8 string.
    String,
    /// 64-bit signed integer.
    Integer,
    /// `true`/`false`.
    Boolean,
}

/// One row of the compiled-in settings schema.
#[derive(Clone, Copy, Debug)]
pub struct SettingSchemaEntry {
    /// Dotted key, e.g. `"server.port"`.
    pub key: &'static str,
    /// Declared value type.
    pub value_type: SchemaValueType,
    /// Default value serialized as JSON text.
    pub default: &'static str,
    /// Whether `set` should warn on stderr when this key is written.
    pub sensitive: bool,
    /// One-line description shown by `config list`.
    pub description: &'static str,
}

/// The fixed, compiled-in schema. Unknown keys are rejected at `get`/`set`/`reset`.
pub const SCHEMA: &[SettingSchemaEntry] = &[
    SettingSchemaEntry {
        key: "server.host",
        value_type: SchemaValueType::String,
        default: "\"127.0.0.1\"",
        sensitive: false,
        description: "Bind address for the HTTP+SSE server",
    },
    SettingSchemaEntry {
        key: "server.port",
        value_type: SchemaValueType::Integer,
        default: "8787",
        sensitive: false,
        description: "Bind port for the HTTP+SSE server",
    },
    SettingSchemaEntry {
        key: "log.level",
        value_type: SchemaValueType::String,
        default: "\"info\"",
        sensitive: false,
        description: "Default tracing filter when DORK_LOG/RUST_LOG is unset",
    },
    SettingSchemaEntry {
        key: "relay.adapter_timeout_secs",
        value_type: SchemaValueType::Integer,
        default: "30",
        sensitive: false,
        description: "Timeout applied to every adapter deliver() call",
    },
    SettingSchemaEntry {
        key: "pulse.max_concurrent_runs",
        value_type: SchemaValueType::Integer,
        default: "4",
        sensitive: false,
        description: "Upper bound on simultaneously executing pulse runs",
    },
    SettingSchemaEntry {
        key: "mesh.discovery_max_depth",
        value_type: SchemaValueType::Integer,
        default: "3",
        sensitive: false,
        description: "Breadth-first depth limit for mesh discovery scans",
    },
    SettingSchemaEntry {
        key: "mesh.default_namespace",
        value_type: SchemaValueType::String,
        default: "\"default\"",
        sensitive: false,
        description: "Namespace assumed when an agent manifest omits one",
    },
    SettingSchemaEntry {
        key: "session.max_idle_minutes",
        value_type: SchemaValueType::Integer,
        default: "60",
        sensitive: false,
        description: "Minutes of inactivity before a session is eligible for eviction",
    },
    SettingSchemaEntry {
        key: "anthropic.api_key",
        value_type: SchemaValueType::String,
        default: "\"\"",
        sensitive: true,
        description: "API token for the Anthropic backend",
    },
];

fn schema_entry(key: &str) -> Option<&'static SettingSchemaEntry> {
    SCHEMA.iter().find(|e| e.key == key)
}

/// Which layer a resolved value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The compiled-in schema default.
    Default,
    /// `$DORK_HOME/config.json`.
    Config,
    /// A `DORK_`-prefixed environment variable.
    Env,
}

/// A resolved key, its value, and which layer produced it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedValue {
    /// The key that was resolved.
    pub key: String,
    /// The value, as JSON.
    pub value: Value,
    /// Which layer it came from.
    pub origin: Origin,
}

/// One schema violation surfaced by [`SettingsStore::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// The offending key.
    pub key: String,
    /// Human-readable description of the failure.
    pub message: String,
}

/// Environment variable name a key resolves to: `DORK_SERVER_PORT` for `server.port`.
fn env_var_name(key: &str) -> String {
    format!("DORK_{}", key.to_uppercase().replace('.', "_"))
}

fn coerce(value_type: SchemaValueType, key: &str, raw: &str) -> Result<Value, SettingsError> {
    match value_type {
        SchemaValueType::String => Ok(Value::String(raw.to_owned())),
        SchemaValueType::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| {
            SettingsError::InvalidValue {
                key: key.to_owned(),
                reason: format!("{raw:?} is not an integer"),
            }
        }),
        SchemaValueType::Boolean => match raw {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            other => Err(SettingsError::InvalidValue {
                key: key.to_owned(),
                reason: format!("{other:?} is not a boolean"),
            }),
        },
    }
}

fn check_type(entry: &SettingSchemaEntry, value: &Value) -> Result<(), SettingsError> {
    let ok = match entry.value_type {
        SchemaValueType::String => value.is_string(),
        SchemaValueType::Integer => value.is_i64() || value.is_u64(),
        SchemaValueType::Boolean => value.is_boolean(),
    };
    if ok {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue {
            key: entry.key.to_owned(),
            reason: format!("expected {:?}, got {value}", entry.value_type),
        })
    }
}

/// Layered settings store rooted at a `$DORK_HOME` directory.
pub struct SettingsStore {
    home: PathBuf,
}

impl SettingsStore {
    /// Open (without reading) a store rooted at `home`. The directory is
    /// created lazily on first write.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Resolve `$DORK_HOME`: the `DORK_HOME` env var if set, otherwise
    /// `~/.dork`.
    #[must_use]
    pub fn resolve_home() -> PathBuf {
        if let Ok(explicit) = std::env::var("DORK_HOME") {
            return PathBuf::from(explicit);
        }
        dirs_home().join(".dork")
    }

    /// The resolved `config.json` path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.home.join("config.json")
    }

    fn read_config_file(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| SettingsError::Malformed {
                path: path.to_string_lossy().into_owned(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(SettingsError::Filesystem(e)),
        }
    }

    /// Atomically persist `config` to `config.json`: write to a scratch
    /// file in the same directory, fsync, then rename into place. The
    /// rename is the commit point.
    fn write_config_file(&self, config: &BTreeMap<String, Value>) -> Result<(), SettingsError> {
        fs::create_dir_all(&self.home).map_err(SettingsError::Filesystem)?;
        let json = serde_json::to_vec_pretty(config).map_err(|source| SettingsError::Malformed {
            path: self.path().to_string_lossy().into_owned(),
            source,
        })?;

        let scratch_path = self.home.join("config.json.tmp");
        {
            let mut file = File::create(&scratch_path).map_err(SettingsError::Filesystem)?;
            file.write_all(&json).map_err(SettingsError::Filesystem)?;
            file.sync_all().map_err(SettingsError::Filesystem)?;
        }
        fs::rename(&scratch_path, self.path()).map_err(SettingsError::Filesystem)?;
        Ok(())
    }

    fn resolve_one(&self, entry: &SettingSchemaEntry, config: &BTreeMap<String, Value>) -> ResolvedValue {
        if let Ok(raw) = std::env::var(env_var_name(entry.key)) {
            if let Ok(value) = coerce(entry.value_type, entry.key, &raw) {
                return ResolvedValue {
                    key: entry.key.to_owned(),
                    value,
                    origin: Origin::Env,
                };
            }
        }
        if let Some(value) = config.get(entry.key) {
            return ResolvedValue {
                key: entry.key.to_owned(),
                value: value.clone(),
                origin: Origin::Config,
            };
        }
        ResolvedValue {
            key: entry.key.to_owned(),
            value: serde_json::from_str(entry.default).unwrap_or(Value::Null),
            origin: Origin::Default,
        }
    }

    /// Resolve a single key across env, config, and defaults.
    ///
    /// # Errors
    /// Returns [`SettingsError::UnknownKey`] if `key` is not in [`SCHEMA`].
    pub fn get(&self, key: &str) -> Result<ResolvedValue, SettingsError> {
        let entry = schema_entry(key).ok_or_else(|| SettingsError::UnknownKey { key: key.to_owned() })?;
        let config = self.read_config_file()?;
        Ok(self.resolve_one(entry, &config))
    }

    /// Validate and persist `value` for `key`, warning on stderr if the key
    /// is sensitive.
    ///
    /// # Errors
    /// Returns [`SettingsError::UnknownKey`] or [`SettingsError::InvalidValue`].
    pub fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let entry = schema_entry(key).ok_or_else(|| SettingsError::UnknownKey { key: key.to_owned() })?;
        check_type(entry, &value)?;

        let mut config = self.read_config_file()?;
        config.insert(key.to_owned(), value);
        self.write_config_file(&config)?;

        if entry.sensitive {
            eprintln!("warning: {key} is marked sensitive; value persisted to {}", self.path().display());
        }
        Ok(())
    }

    /// Every schema key, resolved.
    ///
    /// # Errors
    /// Returns [`SettingsError::Filesystem`] or [`SettingsError::Malformed`]
    /// if `config.json` exists but cannot be read.
    pub fn list(&self) -> Result<Vec<ResolvedValue>, SettingsError> {
        let config = self.read_config_file()?;
        Ok(SCHEMA.iter().map(|entry| self.resolve_one(entry, &config)).collect())
    }

    /// Clear `key` (falling back to its default), or the whole file when
    /// `key` is `None`.
    ///
    /// # Errors
    /// Returns [`SettingsError::UnknownKey`] if `key` is `Some` and not in
    /// [`SCHEMA`].
    pub fn reset(&self, key: Option<&str>) -> Result<(), SettingsError> {
        match key {
            None => match fs::remove_file(self.path()) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SettingsError::Filesystem(e)),
            },
            Some(key) => {
                schema_entry(key).ok_or_else(|| SettingsError::UnknownKey { key: key.to_owned() })?;
                let mut config = self.read_config_file()?;
                config.remove(key);
                self.write_config_file(&config)
            }
        }
    }

    /// Check every currently-set config key against the schema without
    /// mutating anything.
    ///
    /// # Errors
    /// Returns [`SettingsError::Filesystem`] or [`SettingsError::Malformed`]
    /// if `config.json` exists but cannot be read.
    pub fn validate(&self) -> Result<Vec<ValidationError>, SettingsError> {
        let config = self.read_config_file()?;
        let mut errors = Vec::new();
        for (key, value) in &config {
            match schema_entry(key) {
                None => errors.push(ValidationError {
                    key: key.clone(),
                    message: "unknown key".to_owned(),
                }),
                Some(entry) => {
                    if let Err(e) = check_type(entry, value) {
                        errors.push(ValidationError {
                            key: key.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(errors)
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn get_unset_key_returns_default() {
        let (_dir, store) = store();
        let resolved = store.get("server.port").unwrap();
        assert_eq!(resolved.origin, Origin::Default);
        assert_eq!(resolved.value, Value::from(8787));
    }

    #[test]
    fn get_unknown_key_is_validation_failure() {
        let (_dir, store) = store();
        let err = store.get("nope.nope").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn set_then_get_returns_config_origin() {
        let (_dir, store) = store();
        store.set("server.port", Value::from(9090)).unwrap();
        let resolved = store.get("server.port").unwrap();
        assert_eq!(resolved.origin, Origin::Config);
        assert_eq!(resolved.value, Value::from(9090));
        assert!(store.path().exists());
    }

    #[test]
    fn set_rejects_wrong_type() {
        let (_dir, store) = store();
        let err = store.set("server.port", Value::from("not a number")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn set_rejects_unknown_key() {
        let (_dir, store) = store();
        let err = store.set("nope.nope", Value::from(1)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn reset_one_key_falls_back_to_default() {
        let (_dir, store) = store();
        store.set("server.port", Value::from(9090)).unwrap();
        store.reset(Some("server.port")).unwrap();
        let resolved = store.get("server.port").unwrap();
        assert_eq!(resolved.origin, Origin::Default);
    }

    #[test]
    fn reset_all_removes_the_file() {
        let (_dir, store) = store();
        store.set("server.port", Value::from(9090)).unwrap();
        store.reset(None).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn list_covers_every_schema_key() {
        let (_dir, store) = store();
        let resolved = store.list().unwrap();
        assert_eq!(resolved.len(), SCHEMA.len());
    }

    #[test]
    fn validate_flags_unknown_key_written_directly_to_disk() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("config.json"), r#"{"bogus.key": 1}"#).unwrap();
        let errors = store.validate().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "bogus.key");
    }

    #[test]
    fn validate_flags_type_mismatch() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("config.json"), r#"{"server.port": "not-an-int"}"#).unwrap();
        let errors = store.validate().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "server.port");
    }

    #[test]
    fn env_override_takes_precedence_over_config() {
        let (_dir, store) = store();
        store.set("server.port", Value::from(9090)).unwrap();
        std::env::set_var("DORK_SERVER_PORT", "1234");
        let resolved = store.get("server.port").unwrap();
        std::env::remove_var("DORK_SERVER_PORT");
        assert_eq!(resolved.origin, Origin::Env);
        assert_eq!(resolved.value, Value::from(1234));
    }

    #[test]
    fn resolve_home_honours_dork_home_env_var() {
        std::env::set_var("DORK_HOME", "/tmp/dork-settings-test-home");
        let home = SettingsStore::resolve_home();
        std::env::remove_var("DORK_HOME");
        assert_eq!(home, PathBuf::from("/tmp/dork-settings-test-home"));
    }
}
