//! `rfidly watch`: follow scans published on the push channel.

use rfidly_core::{PushState, Station, TAG_SCANNED, convert};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn describe(state: &PushState, color: bool) -> String {
    match state {
        PushState::Connecting => "push: connecting".into(),
        PushState::Connected => format!("push: {}", output::status("connected", true, color)),
        PushState::Disconnected => {
            format!("push: {}", output::status("disconnected", false, color))
        }
        PushState::Error(reason) => {
            format!("push: {} ({reason})", output::status("error", false, color))
        }
    }
}

pub async fn handle(
    station: &Station,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    station.set_count_mode(args.capture.count_mode);
    let color = output::should_color(&global.color);

    if !global.quiet {
        station.stream().on(TAG_SCANNED, move |payload| {
            if let Some(record) = convert::push_record(payload) {
                eprintln!("{}", util::live_line(&record.event, color));
            }
        });
    }

    let mut state = station.push_state();
    station.subscribe_stream(args.channel.as_deref())?;
    if !global.quiet {
        eprintln!("Watching for scans. Press Ctrl-C to stop.");
    }

    let interrupt = tokio::signal::ctrl_c();
    let deadline = util::deadline(args.capture.duration);
    tokio::pin!(interrupt, deadline);

    loop {
        tokio::select! {
            _ = &mut interrupt => break,
            () = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                if !global.quiet {
                    eprintln!("{}", describe(&current, color));
                }
            }
        }
    }

    util::finish_capture(station, args.capture.select_all, global);
    Ok(())
}
