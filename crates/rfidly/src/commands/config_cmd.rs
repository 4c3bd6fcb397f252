//! Config subcommand handlers.

use std::fmt::Write as _;
use std::str::FromStr;

use dialoguer::{Confirm, Input};

use rfidly_core::FieldStyle;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const VALID_KEYS: &str = "backend_url, hub_url, skip_negotiation, push_key, push_cluster, \
                          push_host, push_channel, vendor_filter, attempt_budget, field_style, \
                          batch_path, ca_cert, insecure, timeout, selection_file";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the push key.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "backend_url = \"{}\"", p.backend_url);
        let _ = writeln!(out, "hub_url = \"{}\"", p.hub_url);
        if p.skip_negotiation {
            let _ = writeln!(out, "skip_negotiation = true");
        }
        if p.push_key.is_some() {
            let _ = writeln!(out, "push_key = \"****\"");
        }
        let _ = writeln!(out, "push_cluster = \"{}\"", p.push_cluster);
        if let Some(ref host) = p.push_host {
            let _ = writeln!(out, "push_host = \"{host}\"");
        }
        let _ = writeln!(out, "push_channel = \"{}\"", p.push_channel);
        let _ = writeln!(out, "vendor_filter = \"{}\"", p.vendor_filter);
        let _ = writeln!(out, "attempt_budget = {}", p.attempt_budget);
        if p.field_style == FieldStyle::Pascal {
            let _ = writeln!(out, "field_style = \"pascal\"");
        }
        let _ = writeln!(out, "batch_path = \"{}\"", p.batch_path);
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ref file) = p.selection_file {
            let _ = writeln!(out, "selection_file = \"{}\"", file.display());
        }
    }

    out
}

fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

fn optional(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Apply `key = value` to a profile. Hyphenated spellings are accepted.
pub(crate) fn apply_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key.replace('-', "_").as_str() {
        "backend_url" => {
            parse_value::<url::Url>("backend_url", &value, "a URL")?;
            profile.backend_url = value;
        }
        "hub_url" => {
            parse_value::<url::Url>("hub_url", &value, "a URL")?;
            profile.hub_url = value;
        }
        "skip_negotiation" => {
            profile.skip_negotiation =
                parse_value("skip_negotiation", &value, "'true' or 'false'")?;
        }
        "push_key" => profile.push_key = optional(value),
        "push_cluster" => profile.push_cluster = value,
        "push_host" => profile.push_host = optional(value),
        "push_channel" => profile.push_channel = value,
        "vendor_filter" => profile.vendor_filter = value,
        "attempt_budget" => {
            let budget: u32 = parse_value("attempt_budget", &value, "a positive number")?;
            if budget == 0 {
                return Err(CliError::Validation {
                    field: "attempt_budget".into(),
                    reason: "must be a positive number".into(),
                });
            }
            profile.attempt_budget = budget;
        }
        "field_style" => {
            profile.field_style = match value.to_ascii_lowercase().as_str() {
                "camel" => FieldStyle::Camel,
                "pascal" => FieldStyle::Pascal,
                _ => {
                    return Err(CliError::Validation {
                        field: "field_style".into(),
                        reason: "must be 'camel' or 'pascal'".into(),
                    });
                }
            };
        }
        "batch_path" => {
            if !matches!(value.trim_matches('/'), "batch" | "batch/add") {
                return Err(CliError::Validation {
                    field: "batch_path".into(),
                    reason: "must be 'batch' or 'batch/add'".into(),
                });
            }
            profile.batch_path = value;
        }
        "ca_cert" => profile.ca_cert = Some(value.into()),
        "insecure" => {
            profile.insecure = Some(parse_value("insecure", &value, "'true' or 'false'")?);
        }
        "timeout" => {
            profile.timeout = Some(parse_value("timeout", &value, "a number (seconds)")?);
        }
        "selection_file" => profile.selection_file = Some(value.into()),
        _ => {
            return Err(CliError::Validation {
                field: key.into(),
                reason: format!("unknown config key '{key}'. Valid keys: {VALID_KEYS}"),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("rfidly configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let defaults = Profile::default();

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let backend_url: String = Input::new()
                .with_prompt("Backend URL")
                .default(defaults.backend_url.clone())
                .validate_with(|v: &String| v.parse::<url::Url>().map(|_| ()))
                .interact_text()
                .map_err(prompt_err)?;

            let hub_url: String = Input::new()
                .with_prompt("Device hub URL")
                .default(defaults.hub_url.clone())
                .validate_with(|v: &String| v.parse::<url::Url>().map(|_| ()))
                .interact_text()
                .map_err(prompt_err)?;

            let push_key: String = Input::new()
                .with_prompt("Push app key (empty to disable live stream)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let push_key = optional(push_key);
            let push_cluster = if push_key.is_some() {
                Input::new()
                    .with_prompt("Push cluster")
                    .default(defaults.push_cluster.clone())
                    .interact_text()
                    .map_err(prompt_err)?
            } else {
                defaults.push_cluster.clone()
            };

            let mut cfg = config::load_config_or_default();
            if cfg.profiles.contains_key(&profile_name) {
                let overwrite = Confirm::new()
                    .with_prompt(format!("Profile '{profile_name}' exists. Overwrite?"))
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?;
                if !overwrite {
                    eprintln!("Aborted.");
                    return Ok(());
                }
            }

            let profile = Profile {
                backend_url,
                hub_url,
                push_key,
                push_cluster,
                ..defaults
            };
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());

            save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Test it: rfidly devices discover");

            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            apply_key(profile, &key, value)?;

            save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_key_accepts_hyphenated_names() {
        let mut profile = Profile::default();
        apply_key(&mut profile, "push-key", "abc123".into()).unwrap();
        apply_key(&mut profile, "attempt-budget", "3".into()).unwrap();
        apply_key(&mut profile, "field_style", "Pascal".into()).unwrap();

        assert_eq!(profile.push_key.as_deref(), Some("abc123"));
        assert_eq!(profile.attempt_budget, 3);
        assert_eq!(profile.field_style, FieldStyle::Pascal);
    }

    #[test]
    fn apply_key_rejects_bad_values() {
        let mut profile = Profile::default();
        for (key, value) in [
            ("backend_url", "not a url"),
            ("attempt_budget", "0"),
            ("batch_path", "batches"),
            ("insecure", "maybe"),
            ("field_style", "snake"),
        ] {
            let err = apply_key(&mut profile, key, value.into()).unwrap_err();
            assert!(matches!(err, CliError::Validation { .. }), "{key}");
        }
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn unknown_key_lists_valid_keys() {
        let mut profile = Profile::default();
        let err = apply_key(&mut profile, "controller", "x".into()).unwrap_err();
        match err {
            CliError::Validation { reason, .. } => assert!(reason.contains("backend_url")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_push_key_clears_it() {
        let mut profile = Profile {
            push_key: Some("old".into()),
            ..Profile::default()
        };
        apply_key(&mut profile, "push_key", "  ".into()).unwrap();
        assert!(profile.push_key.is_none());
    }

    #[test]
    fn redacted_config_masks_push_key() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                push_key: Some("secret-key".into()),
                ..Profile::default()
            },
        );
        let text = format_config_redacted(&cfg);
        assert!(text.contains("[profiles.lab]"));
        assert!(text.contains("push_key = \"****\""));
        assert!(!text.contains("secret-key"));
    }
}
