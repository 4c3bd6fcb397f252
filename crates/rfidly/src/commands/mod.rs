//! Command dispatch: bridges CLI args -> station operations -> output formatting.

pub mod batches;
pub mod config_cmd;
pub mod devices;
pub mod scan;
pub mod selection;
pub mod simulate;
pub mod tags;
pub mod transactions;
pub mod util;
pub mod watch;

use rfidly_core::Station;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a station-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    station: &Station,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(station, args, global).await,
        Command::Scan(args) => scan::handle(station, args, global).await,
        Command::Watch(args) => watch::handle(station, args, global).await,
        Command::Simulate(args) => simulate::handle(station, args, global),
        Command::Selection(args) => selection::handle(station, args, global),
        Command::Batch(args) => batches::handle_create(station, args, global).await,
        Command::Batches(args) => batches::handle_list(station, args, global).await,
        Command::Tags(args) => tags::handle(station, args, global).await,
        Command::Transactions(args) => transactions::handle(station, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
