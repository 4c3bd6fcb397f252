//! `rfidly simulate`: push random scans through the local pipeline.

use rfidly_core::Station;

use crate::cli::{GlobalOpts, SimulateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(
    station: &Station,
    args: SimulateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.count == 0 {
        return Err(CliError::Validation {
            field: "count".into(),
            reason: "must be at least 1".into(),
        });
    }

    station.set_count_mode(args.count_mode);
    let scans = station.simulate(args.count, args.epc.as_deref());

    if !global.quiet {
        let color = output::should_color(&global.color);
        for scan in &scans {
            eprintln!("{}", util::live_line(scan, color));
        }
    }

    util::finish_capture(station, args.select_all, global);
    Ok(())
}
