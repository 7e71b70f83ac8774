//! CLI configuration: thin wrapper around `datalane_config` shared types.
//!
//! Adds CLI-specific resolution that respects `GlobalOpts` flag
//! overrides (--base-url, --token, --insecure, ...) and assembles the
//! dispatcher every data command runs through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use secrecy::SecretString;

use datalane_core::{
    DataView, Dispatcher, EntityConfig, FileStore, HttpTransport, KvStore, PageRouter, ReuseCache,
    Router, SystemClock, TlsMode, TransportConfig,
};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use datalane_config::{Config, Profile, config_path, load_config};

/// File the response cache persists to.
pub fn cache_file() -> PathBuf {
    datalane_config::cache_dir().join("responses.json")
}

// ── Flag defaults from config ───────────────────────────────────────

/// Fill an unset `--output` from `[defaults]`.
pub fn apply_defaults(global: &mut GlobalOpts, cfg: &Config) {
    if global.output.is_none() {
        global.output = OutputFormat::from_str(&cfg.defaults.output, true).ok();
    }
}

// ── Transport resolution ────────────────────────────────────────────

/// Base URL and transport settings for the active profile.
///
/// CLI flag overrides take priority over profile values. Without a
/// profile, `--base-url` alone is enough.
pub fn resolve_transport(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<(String, TransportConfig), CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());
    let profile = cfg.profiles.get(&profile_name);

    if profile.is_none() && global.base_url.is_none() {
        if global.profile.is_some() {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }
    let fallback = Profile::default();
    let profile = profile.unwrap_or(&fallback);

    // 1. Base URL (flag > env > profile)
    let base_url = global
        .base_url
        .clone()
        .unwrap_or_else(|| profile.base_url.clone());
    url::Url::parse(&base_url).map_err(|e| CliError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL '{base_url}': {e}"),
    })?;

    // 2. TLS verification
    let tls = if global.insecure || profile.insecure.unwrap_or(cfg.defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    // 3. Timeout
    let timeout = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(cfg.defaults.timeout);

    let mut transport = TransportConfig {
        tls,
        timeout: Duration::from_secs(timeout),
        ..TransportConfig::default()
    };

    // 4. Bearer token (flag > profile)
    let token = global
        .token
        .clone()
        .map(SecretString::from)
        .or_else(|| datalane_config::resolve_token(profile));
    if let Some(token) = token {
        transport = transport.with_bearer_token(token);
    }

    Ok((base_url, transport))
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

// ── Dispatcher assembly ─────────────────────────────────────────────

fn page_router(global: &GlobalOpts) -> Arc<PageRouter> {
    Arc::new(
        global
            .page
            .as_deref()
            .map_or_else(PageRouter::new, PageRouter::with_page),
    )
}

/// A dispatcher plus the per-request timeout it was built with.
pub struct Session {
    pub dispatcher: Dispatcher,
    pub request_timeout: Duration,
}

/// Dispatcher over the HTTP transport, persisting reusable responses
/// to [`cache_file`].
pub fn build_session(global: &GlobalOpts, cfg: &Config) -> Result<Session, CliError> {
    let (base_url, transport_config) = resolve_transport(global, cfg)?;
    let transport = HttpTransport::new(Some(&base_url), &transport_config)
        .map_err(datalane_core::CoreError::from)?;

    tracing::debug!(%base_url, cache = %cache_file().display(), "building dispatcher");

    let dispatcher = Dispatcher::builder(Arc::new(transport))
        .config(cfg.dispatcher.to_dispatcher_config()?)
        .store(Arc::new(FileStore::new(cache_file())))
        .router(page_router(global))
        .build();
    Ok(Session {
        dispatcher,
        request_timeout: transport_config.timeout,
    })
}

/// The persisted response cache without a backend, for `cache` commands.
pub fn open_cache(global: &GlobalOpts, cfg: &Config) -> Result<ReuseCache, CliError> {
    let settings = cfg.dispatcher.to_dispatcher_config()?;
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(cache_file()));
    let router: Arc<dyn Router> = page_router(global);
    let default_timeout_ms =
        u64::try_from(settings.default_reuse_timeout.as_millis()).unwrap_or(u64::MAX);
    Ok(ReuseCache::new(
        store,
        router,
        Arc::new(SystemClock),
        default_timeout_ms,
    ))
}

/// Bind a configured entity to `view`.
pub fn entity_config(
    cfg: &Config,
    name: &str,
    view: Arc<dyn DataView>,
) -> Result<EntityConfig, CliError> {
    let definition = cfg.entity(name)?;
    let mut builder = EntityConfig::builder(definition.to_data_config(name)?).view(view);
    if let Some(class) = definition.blob_class() {
        builder = builder.blob_class(class);
    }
    Ok(builder.build()?)
}
