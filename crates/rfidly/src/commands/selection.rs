//! Selection command handlers.
//!
//! The selection lives in the profile's selection file, so it carries over
//! from `scan`, `watch` and `simulate` runs to `batch create`.

use rfidly_core::Station;

use crate::cli::{GlobalOpts, SelectionArgs, SelectionCommand};
use crate::error::CliError;

use super::util;

pub fn handle(
    station: &Station,
    args: SelectionArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SelectionCommand::Show => {
            util::print_records(&station.selected_records(), global);
            Ok(())
        }

        SelectionCommand::Drop { ids } => {
            let selected = station.selected_records();
            let mut ids = ids
                .iter()
                .map(|raw| {
                    let id = util::parse_record_id(raw)?;
                    if selected.iter().any(|r| r.id == id) {
                        Ok(id)
                    } else {
                        Err(CliError::NotFound {
                            resource_type: "Selected record".into(),
                            identifier: raw.clone(),
                            list_command: "selection show".into(),
                        })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            ids.sort_unstable();
            ids.dedup();

            for id in &ids {
                station.toggle_select(*id)?;
            }
            if !global.quiet {
                eprintln!("Dropped {} record(s) from the selection", ids.len());
            }
            Ok(())
        }

        SelectionCommand::Clear => {
            let count = station.selected_records().len();
            station.clear_selection();
            if !global.quiet {
                eprintln!("Cleared {count} record(s)");
            }
            Ok(())
        }
    }
}
