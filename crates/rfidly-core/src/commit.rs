// ── Batch commit ──
//
// Resolves each selected record to a backend transaction id, one call at
// a time in selection order, then creates the batch from the ids that
// resolved. Per-record failures are collected; zero resolved ids or a
// failed batch-add abort the commit.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rfidly_api::{BackendClient, NewBatch};
use tracing::{debug, info, warn};

use crate::convert;
use crate::error::CoreError;
use crate::model::{CommitReport, RecordError, RecordId, TransactionRecord};

/// Name and optional description of the batch to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub name: String,
    pub description: Option<String>,
}

impl BatchRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Turns a selection into a durable batch.
///
/// Ids resolved for temporary records are cached, so retrying after a
/// failed batch-add does not save the same scan twice.
pub struct BatchCommitter {
    backend: BackendClient,
    resolved: Mutex<HashMap<RecordId, i64>>,
}

impl BatchCommitter {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Id already saved for a temporary record during an earlier attempt.
    pub fn cached_id(&self, record: &RecordId) -> Option<i64> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(record)
            .copied()
    }

    /// Commit `records` (in selection order) as one batch.
    pub async fn commit(
        &self,
        request: &BatchRequest,
        records: &[TransactionRecord],
    ) -> Result<CommitReport, CoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("batch name is required"));
        }
        if records.is_empty() {
            return Err(CoreError::validation("no transactions selected"));
        }
        info!(name, records = records.len(), "committing batch");

        let mut transaction_ids = Vec::with_capacity(records.len());
        let mut resolved = Vec::new();
        let mut errors = Vec::new();

        for record in records {
            if let Some(id) = record.id.as_persisted() {
                transaction_ids.push(id);
                continue;
            }
            if let Some(id) = self.cached_id(&record.id) {
                debug!(record = %record.id, id, "reusing saved transaction");
                transaction_ids.push(id);
                resolved.push((record.id, id));
                continue;
            }

            let tx = convert::new_transaction(record, None);
            match self.backend.add_transaction(&tx).await {
                Ok(id) => {
                    debug!(epc = %record.epc(), id, "transaction saved");
                    self.resolved
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(record.id, id);
                    transaction_ids.push(id);
                    resolved.push((record.id, id));
                }
                Err(e) => {
                    let err = CoreError::TransactionSave {
                        epc: record.epc().to_owned(),
                        message: e.to_string(),
                    };
                    warn!(record = %record.id, error = %err, "transaction not saved");
                    errors.push(RecordError {
                        record: record.id,
                        epc: record.epc().to_owned(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if transaction_ids.is_empty() {
            return Err(CoreError::BatchCommit {
                message: "failed to save any transactions".into(),
            });
        }

        let body = NewBatch {
            name: name.to_owned(),
            description: request
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned),
            transaction_ids: transaction_ids.clone(),
        };
        let created = self.backend.create_batch(&body).await.map_err(|e| {
            warn!(error = %e, "batch-add failed, saved transactions kept for retry");
            CoreError::BatchCommit {
                message: e.to_string(),
            }
        })?;

        {
            let mut cache = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
            for (record, _) in &resolved {
                cache.remove(record);
            }
        }

        let batch = convert::batch_from_response(created, &transaction_ids);
        let report = CommitReport {
            saved_count: transaction_ids.len(),
            failed_count: errors.len(),
            batch,
            transaction_ids,
            per_record_errors: errors,
            resolved,
        };
        info!(
            batch_id = report.batch_id(),
            saved = report.saved_count,
            failed = report.failed_count,
            "batch created"
        );
        Ok(report)
    }
}
