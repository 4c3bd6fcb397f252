//! `rfidly scan`: connect to a reader and capture until stopped.

use rfidly_core::{SessionPhase, Station};
use tracing::info;

use crate::cli::{GlobalOpts, ScanArgs};
use crate::error::CliError;
use crate::output;

use super::{devices, util};

pub async fn handle(
    station: &Station,
    args: ScanArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (ip, port) = if let (Some(ip), Some(port)) = (args.ip, args.port) {
        (ip, port)
    } else {
        let found = devices::discover(station, None, None, global).await?;
        let first = found.into_iter().next().ok_or_else(|| CliError::NotFound {
            resource_type: "Reader".into(),
            identifier: station.session().settings().vendor_filter.clone(),
            list_command: "devices discover".into(),
        })?;
        info!(ip = %first.ip, port = first.port, "using first discovered reader");
        (first.ip, first.port)
    };

    station.set_count_mode(args.capture.count_mode);

    if !global.quiet {
        let color = output::should_color(&global.color);
        station
            .session()
            .on_tag_read(move |scan| eprintln!("{}", util::live_line(scan, color)));
    }

    // Subscribe before connecting so a failure mid-run is seen.
    let mut state = station.session_state();
    station.start_scanning(&ip, port, args.batch_id).await?;

    if !global.quiet {
        let current = station.session().current();
        eprintln!(
            "Scanning on {ip}:{port} (reader {}). Press Ctrl-C to stop.",
            current.device_version.as_deref().unwrap_or("unknown")
        );
    }

    let failure = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        () = util::deadline(args.capture.duration) => None,
        failed = state.wait_for(|s| s.phase == SessionPhase::Error) => {
            failed.ok().and_then(|s| s.last_error.clone())
        }
    };

    station.stop_scanning().await;
    util::finish_capture(station, args.capture.select_all, global);

    match failure {
        Some(message) => Err(CliError::ConnectionFailed { message }),
        None => Ok(()),
    }
}
