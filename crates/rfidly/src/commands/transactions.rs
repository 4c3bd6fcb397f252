//! Transaction command handlers.

use tabled::Tabled;

use rfidly_core::{Station, TransactionResponse};

use crate::cli::{GlobalOpts, TransactionsArgs, TransactionsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct TransactionRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "EPC")]
    epc: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Count")]
    count: String,
    #[tabled(rename = "Batch")]
    batch: String,
}

impl From<&TransactionResponse> for TransactionRow {
    fn from(t: &TransactionResponse) -> Self {
        Self {
            id: t.id,
            epc: t.epc.clone().unwrap_or_default(),
            rssi: t.rssi.clone().unwrap_or_default(),
            timestamp: t.timestamp.clone().unwrap_or_default(),
            mode: t.mode.clone().unwrap_or_default(),
            count: t.scan_count.map(|c| c.to_string()).unwrap_or_default(),
            batch: t.batch_id.map(|b| b.to_string()).unwrap_or_default(),
        }
    }
}

pub async fn handle(
    station: &Station,
    args: TransactionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        TransactionsCommand::List(list) => {
            let transactions = util::collect_pages(&list, |page, per_page| {
                station.list_transactions(page, per_page)
            })
            .await?;
            let out = output::render_list(
                &global.output,
                &transactions,
                |t| TransactionRow::from(t),
                |t| t.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
