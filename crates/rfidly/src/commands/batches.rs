//! Batch command handlers.

use tabled::Tabled;

use rfidly_core::{BatchRequest, BatchResponse, CommitReport, Station};

use crate::cli::{BatchArgs, BatchCommand, BatchesArgs, BatchesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Transactions")]
    transactions: usize,
}

impl From<&BatchResponse> for BatchRow {
    fn from(b: &BatchResponse) -> Self {
        Self {
            id: b.id,
            name: b.name.clone(),
            description: b.description.clone().unwrap_or_default(),
            created: b.created_at.clone().unwrap_or_default(),
            transactions: b.transaction_ids.len(),
        }
    }
}

fn report_detail(r: &CommitReport) -> String {
    let mut lines = vec![
        format!("Batch:    {} ({})", r.batch.id, r.batch.name),
        format!(
            "Created:  {}",
            r.batch
                .created_at
                .as_ref()
                .map_or_else(|| "-".into(), util::local_time)
        ),
        format!("Saved:    {}", r.saved_count),
        format!("Failed:   {}", r.failed_count),
    ];
    for failure in &r.per_record_errors {
        lines.push(format!(
            "  ✗ {} ({}): {}",
            failure.epc, failure.record, failure.message
        ));
    }
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle_create(
    station: &Station,
    args: BatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        BatchCommand::Create { name, description } => {
            let mut request = BatchRequest::new(name);
            if let Some(description) = description {
                request = request.with_description(description);
            }

            let report = station.commit_batch(&request).await?;
            let out = output::render_single(&global.output, &report, report_detail, |r| {
                r.batch_id().to_string()
            });
            output::print_output(&out, global.quiet);

            if report.is_partial() {
                return Err(CliError::PartialCommit {
                    batch_id: report.batch_id(),
                    failed: report.failed_count,
                    total: report.saved_count + report.failed_count,
                });
            }
            Ok(())
        }
    }
}

pub async fn handle_list(
    station: &Station,
    args: BatchesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        BatchesCommand::List(list) => {
            let batches =
                util::collect_pages(&list, |page, per_page| station.list_batches(page, per_page))
                    .await?;
            let out = output::render_list(
                &global.output,
                &batches,
                |b| BatchRow::from(b),
                |b| b.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
