//! Device command handlers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use rfidly_core::{DeviceSessionState, DiscoveredDevice, Station};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Port")]
    port: u16,
}

impl From<&DiscoveredDevice> for DeviceRow {
    fn from(d: &DiscoveredDevice) -> Self {
        Self {
            mac: if d.mac.is_empty() { "-".into() } else { d.mac.clone() },
            ip: d.ip.clone(),
            port: d.port,
        }
    }
}

fn state_detail(s: &DeviceSessionState) -> String {
    [
        format!("Phase:    {}", s.phase),
        format!("Device:   {}", s.device_ip.as_deref().unwrap_or("-")),
        format!("Version:  {}", s.device_version.as_deref().unwrap_or("-")),
    ]
    .join("\n")
}

// ── Discovery ───────────────────────────────────────────────────────

/// Run discovery with a spinner showing the hub's attempt count.
pub async fn discover(
    station: &Station,
    vendor: Option<&str>,
    attempts: Option<u32>,
    global: &GlobalOpts,
) -> Result<Vec<DiscoveredDevice>, CliError> {
    let settings = station.session().settings();
    let vendor = vendor.unwrap_or(&settings.vendor_filter);
    let budget = attempts.unwrap_or(settings.attempt_budget);

    let spinner = if global.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Searching for {vendor} readers"));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let progress = {
        let spinner = spinner.clone();
        let vendor = vendor.to_owned();
        move |attempt: u32| {
            spinner.set_message(format!(
                "Searching for {vendor} readers (attempt {attempt}/{budget})"
            ));
        }
    };

    let result = station
        .session()
        .discover_devices(vendor, budget, progress)
        .await;
    spinner.finish_and_clear();
    Ok(result?)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    station: &Station,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::Discover { vendor, attempts } => {
            let devices = discover(station, vendor.as_deref(), attempts, global).await?;
            if devices.is_empty() && !global.quiet {
                eprintln!("No readers found");
            }
            let out = output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::from(d),
                |d| format!("{}:{}", d.ip, d.port),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Connect { ip, port } => {
            station.session().connect(&ip, port).await?;
            let state = station.session().current();
            station.stop_scanning().await;

            let out = output::render_single(&global.output, &state, state_detail, |s| {
                s.device_version.clone().unwrap_or_default()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Disconnect => {
            let confirmed = station.disconnect_device().await?;
            if !global.quiet {
                let color = output::should_color(&global.color);
                let text = if confirmed {
                    "Reader disconnected"
                } else {
                    "Disconnect sent, reader did not confirm"
                };
                eprintln!("{}", output::status(text, confirmed, color));
            }
            Ok(())
        }
    }
}
