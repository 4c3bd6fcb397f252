//! CLI configuration: thin wrapper around `rfidly_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--backend, --hub, --timeout).

use std::time::Duration;

use rfidly_core::StationConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use rfidly_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Translate a `Profile` + global flags into a `StationConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<StationConfig, CliError> {
    let mut station = rfidly_config::profile_to_station_config(profile, profile_name)?;

    if let Some(ref backend) = global.backend {
        station.backend_url = parse_url("backend", backend)?;
    }
    if let Some(ref hub) = global.hub {
        station.hub_url = parse_url("hub", hub)?;
    }
    if let Some(timeout) = global.timeout {
        station.timeout = Duration::from_secs(timeout);
    }

    Ok(station)
}

/// Build a `StationConfig` from the config file, profile, and CLI overrides.
pub fn build_station_config(global: &GlobalOpts) -> Result<StationConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, global);
    }

    // A profile asked for by name must exist.
    if global.profile.is_some() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile -- flags alone are enough to reach a station.
    if global.backend.is_none() && global.hub.is_none() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }
    resolve_profile(&Profile::default(), &profile_name, global)
}
