//! Shared configuration for the rfidly CLI.
//!
//! TOML profiles merged over defaults and `RFIDLY_` environment variables,
//! and translation to `rfidly_core::StationConfig`. The CLI layers its
//! `GlobalOpts` overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use rfidly_core::{FieldStyle, PushSettings, SessionSettings, StationConfig, TlsVerification};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

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

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named station profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named station profile: one backend, one device hub, one push app.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Inventory backend REST base URL.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Device hub endpoint.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Open the hub WebSocket directly instead of negotiating first.
    #[serde(default)]
    pub skip_negotiation: bool,

    /// Push service app key. Without one the live stream is disabled.
    pub push_key: Option<String>,

    #[serde(default = "default_push_cluster")]
    pub push_cluster: String,

    /// Explicit push WebSocket endpoint (self-hosted push servers).
    pub push_host: Option<String>,

    #[serde(default = "default_push_channel")]
    pub push_channel: String,

    /// Vendor prefix passed to discovery.
    #[serde(default = "default_vendor_filter")]
    pub vendor_filter: String,

    /// Discovery attempt budget.
    #[serde(default = "default_attempt_budget")]
    pub attempt_budget: u32,

    /// Key spelling for the transaction-add body.
    #[serde(default)]
    pub field_style: FieldStyle,

    /// `batch` or `batch/add`.
    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid TLS certificates.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Where the pending selection is kept between runs.
    pub selection_file: Option<PathBuf>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            hub_url: default_hub_url(),
            skip_negotiation: false,
            push_key: None,
            push_cluster: default_push_cluster(),
            push_host: None,
            push_channel: default_push_channel(),
            vendor_filter: default_vendor_filter(),
            attempt_budget: default_attempt_budget(),
            field_style: FieldStyle::default(),
            batch_path: default_batch_path(),
            ca_cert: None,
            insecure: None,
            timeout: None,
            selection_file: None,
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:9001".into()
}
fn default_hub_url() -> String {
    "http://localhost:8080/deviceHub".into()
}
fn default_push_cluster() -> String {
    "ap1".into()
}
fn default_push_channel() -> String {
    rfidly_core::DEFAULT_CHANNEL.into()
}
fn default_vendor_filter() -> String {
    "ZL".into()
}
fn default_attempt_budget() -> u32 {
    10
}
fn default_batch_path() -> String {
    "batch".into()
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rfidly", "rfidly")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for runtime state such as saved selections.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Default selection file for a profile.
pub fn default_selection_file(profile_name: &str) -> PathBuf {
    data_dir().join(format!("selection-{profile_name}.json"))
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("rfidly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load a Config from `path`, merged over defaults and `RFIDLY_` env vars.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RFIDLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile translation ─────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `StationConfig` from a profile, without CLI flag overrides.
pub fn profile_to_station_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<StationConfig, ConfigError> {
    let backend_url = parse_url("backend_url", &profile.backend_url)?;
    let hub_url = parse_url("hub_url", &profile.hub_url)?;

    let push = match profile.push_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Some(PushSettings {
            key: key.to_owned(),
            cluster: profile.push_cluster.clone(),
            host: profile
                .push_host
                .as_deref()
                .map(|raw| parse_url("push_host", raw))
                .transpose()?,
            channel: profile.push_channel.clone(),
        }),
        _ => None,
    };

    if !matches!(profile.batch_path.trim_matches('/'), "batch" | "batch/add") {
        return Err(ConfigError::Validation {
            field: "batch_path".into(),
            reason: format!("expected 'batch' or 'batch/add', got '{}'", profile.batch_path),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(StationConfig {
        backend_url,
        hub_url,
        skip_negotiation: profile.skip_negotiation,
        push,
        session: SessionSettings {
            vendor_filter: profile.vendor_filter.clone(),
            attempt_budget: profile.attempt_budget,
            ..SessionSettings::default()
        },
        field_style: profile.field_style,
        batch_path: profile.batch_path.trim_matches('/').to_owned(),
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout)),
        selection_file: Some(
            profile
                .selection_file
                .clone()
                .unwrap_or_else(|| default_selection_file(profile_name)),
        ),
    })
}
