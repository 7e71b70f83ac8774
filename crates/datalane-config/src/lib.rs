//! Configuration for datalane front ends.
//!
//! TOML profiles and entity definitions, token resolution (env var +
//! plaintext), and translation to `datalane_core` types: entity
//! definitions become `DataConfig`s, `[dispatcher]` becomes a
//! `DispatcherConfig`, and a profile becomes a `TransportConfig`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use datalane_core::{
    BatchCall, BlobClass, DataConfig, DispatcherConfig, Method, Operation, ReusePolicy, TlsMode,
    TransportConfig,
};

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "DATALANE_CONFIG";
/// Overrides the cache directory.
pub const CACHE_DIR_ENV: &str = "DATALANE_CACHE_DIR";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    /// Named entity definitions.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            dispatcher: DispatcherSettings::default(),
            profiles: BTreeMap::new(),
            entities: BTreeMap::new(),
        }
    }
}

impl Config {
    /// `requested`, else `default_profile`, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDefinition, ConfigError> {
        self.entities
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEntity { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// Dispatcher tuning, `[dispatcher]` in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherSettings {
    #[serde(default = "default_reuse_timeout_ms")]
    pub reuse_timeout_ms: u64,

    #[serde(default = "default_stale_queue_ms")]
    pub stale_queue_ms: u64,

    /// HTTP verbs every entity may use without listing them.
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            reuse_timeout_ms: default_reuse_timeout_ms(),
            stale_queue_ms: default_stale_queue_ms(),
            allowed_methods: default_allowed_methods(),
        }
    }
}

fn default_reuse_timeout_ms() -> u64 {
    300_000
}
fn default_stale_queue_ms() -> u64 {
    30_000
}
fn default_allowed_methods() -> Vec<String> {
    vec!["GET".into()]
}

impl DispatcherSettings {
    pub fn to_dispatcher_config(&self) -> Result<DispatcherConfig, ConfigError> {
        let allowed_methods = self
            .allowed_methods
            .iter()
            .map(|m| {
                m.parse::<Method>().map_err(|_| {
                    invalid(
                        "dispatcher.allowed_methods",
                        format!("unknown HTTP method '{m}'"),
                    )
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(DispatcherConfig {
            default_reuse_timeout: Duration::from_millis(self.reuse_timeout_ms),
            stale_queue_after: Duration::from_millis(self.stale_queue_ms),
            allowed_methods,
        })
    }
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Base URL relative entity URLs resolve against.
    pub base_url: String,

    /// Bearer token (plaintext — prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,
}

/// One `[entities.<name>]` table. Exactly one of `url` and `batch`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntityDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Vec<BatchCall>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_operations: BTreeSet<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_operation: Option<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReusePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_tag: Option<String>,
}

impl EntityDefinition {
    /// Build and validate the core `DataConfig` for entity `name`.
    pub fn to_data_config(&self, name: &str) -> Result<DataConfig, ConfigError> {
        let field = format!("entities.{name}");
        let mut config = match (&self.url, &self.batch) {
            (Some(url), None) => DataConfig::for_url(url.clone()),
            (None, Some(calls)) => DataConfig::for_batch(calls.clone()),
            (Some(_), Some(_)) => {
                return Err(invalid(field, "`url` and `batch` are mutually exclusive"));
            }
            (None, None) => return Err(invalid(field, "one of `url` or `batch` is required")),
        };

        config = config.allow_all(self.allowed_operations.iter().copied());
        if let Some(op) = self.default_operation {
            config = config.default_operation(op);
        }
        if let Some(ref reuse) = self.reuse {
            config = config.reuse(reuse.clone());
        }
        if let Some(ref tag) = self.socket_tag {
            config = config.socket_tag(tag.clone());
        }

        config.validate().map_err(|e| invalid(field, e.to_string()))?;
        Ok(config)
    }

    pub fn blob_class(&self) -> Option<BlobClass> {
        self.blob_class.as_deref().map(BlobClass::new)
    }

    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "datalane", "datalane")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path: `$DATALANE_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(&[".config", "datalane", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for the persisted response cache.
pub fn cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(&[".cache", "datalane"]),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path`, then `DATALANE_*` variables (`__` separates
/// nesting levels, e.g. `DATALANE_DEFAULTS__TIMEOUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DATALANE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Bearer token from the profile: `token_env` first, then `token`.
pub fn resolve_token(profile: &Profile) -> Option<SecretString> {
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    profile.token.clone().map(SecretString::from)
}

/// Build a `TransportConfig` from a profile — no CLI flag overrides.
pub fn profile_to_transport_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<TransportConfig, ConfigError> {
    url::Url::parse(&profile.base_url)
        .map_err(|e| invalid("base_url", format!("{}: {e}", profile.base_url)))?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let mut transport = TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..TransportConfig::default()
    };
    if let Some(token) = resolve_token(profile) {
        transport = transport.with_bearer_token(token);
    }
    Ok(transport)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use datalane_core::CacheScope;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "staging"

[defaults]
output = "json"

[dispatcher]
stale_queue_ms = 5000
allowed_methods = ["GET", "post"]

[profiles.staging]
base_url = "https://staging.example.com/api"
token = "plain"

[entities.users]
url = "/users"
allowed_operations = ["get_list", "post"]
default_operation = "get_list"
blob_class = "User"
reuse = { timeout_ms = 60000, scope = "in_page" }

[entities.dashboard]
batch = [
  { identifier = "me", url = "/me", operation = "get" },
  { identifier = "stats", url = "/stats", operation = "get" },
]

[entities.broken]
url = "/x"
batch = [{ identifier = "a", url = "/a", operation = "get" }]
"#;

    fn sample() -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        load_config_from(file.path()).unwrap()
    }

    #[test]
    fn loads_file_over_defaults() {
        let cfg = sample();
        assert_eq!(cfg.active_profile_name(None), "staging");
        assert_eq!(cfg.active_profile_name(Some("prod")), "prod");
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.timeout, 30);
        assert_eq!(cfg.dispatcher.reuse_timeout_ms, 300_000);
        assert_eq!(cfg.entities.len(), 3);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.entities.is_empty());
    }

    #[test]
    fn dispatcher_settings_convert() {
        let config = sample().dispatcher.to_dispatcher_config().unwrap();
        assert_eq!(config.stale_queue_after, Duration::from_secs(5));
        assert_eq!(
            config.allowed_methods,
            BTreeSet::from([Method::Get, Method::Post])
        );

        let bad = DispatcherSettings {
            allowed_methods: vec!["FETCH".into()],
            ..DispatcherSettings::default()
        };
        assert!(matches!(
            bad.to_dispatcher_config(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn url_entity_converts() {
        let cfg = sample();
        let users = cfg.entity("users").unwrap();
        let data = users.to_data_config("users").unwrap();
        assert_eq!(data.url(), Some("/users"));
        assert_eq!(data.default_operation, Operation::GetList);
        assert!(data.allowed_operations.contains(&Operation::Post));
        assert_eq!(data.reuse.timeout_ms, 60_000);
        assert_eq!(data.reuse.scope, CacheScope::InPage);
        assert!(data.reuse.enable);
        assert_eq!(users.blob_class().unwrap().name(), "User");
    }

    #[test]
    fn batch_entity_converts() {
        let cfg = sample();
        let data = cfg
            .entity("dashboard")
            .unwrap()
            .to_data_config("dashboard")
            .unwrap();
        let ids: Vec<&str> = data
            .batch()
            .unwrap()
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["me", "stats"]);
    }

    #[test]
    fn url_and_batch_are_exclusive() {
        let err = sample()
            .entity("broken")
            .unwrap()
            .to_data_config("broken")
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
        assert!(matches!(
            sample().entity("nope"),
            Err(ConfigError::UnknownEntity { .. })
        ));
        assert!(EntityDefinition::default().to_data_config("empty").is_err());
    }

    #[test]
    fn transport_config_from_profile() {
        let cfg = sample();
        let profile = &cfg.profiles["staging"];
        let transport = profile_to_transport_config(profile, &cfg.defaults).unwrap();
        assert_eq!(transport.tls, TlsMode::System);
        assert_eq!(transport.timeout, Duration::from_secs(30));
        assert_eq!(transport.bearer_token.unwrap().expose_secret(), "plain");

        let insecure = Profile {
            base_url: "https://localhost:8443".into(),
            insecure: Some(true),
            timeout: Some(5),
            ..Profile::default()
        };
        let transport = profile_to_transport_config(&insecure, &cfg.defaults).unwrap();
        assert_eq!(transport.tls, TlsMode::DangerAcceptInvalid);
        assert!(transport.bearer_token.is_none());

        let bad = Profile {
            base_url: "not a url".into(),
            ..Profile::default()
        };
        assert!(profile_to_transport_config(&bad, &cfg.defaults).is_err());
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_config_to(&sample(), &path).unwrap();

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.default_profile.as_deref(), Some("staging"));
        assert!(reloaded.entity("dashboard").unwrap().is_batch());
    }
}
