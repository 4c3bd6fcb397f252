// Batch endpoints

use tracing::debug;

use super::client::BackendClient;
use super::models::{BatchResponse, MaybeWrapped, NewBatch, Page};
use crate::error::Error;

impl BackendClient {
    /// Create a batch grouping already-persisted transactions.
    ///
    /// `POST /batch` (or `/batch/add`, see [`BackendClient::with_batch_path`]).
    pub async fn create_batch(&self, batch: &NewBatch) -> Result<BatchResponse, Error> {
        debug!(
            name = %batch.name,
            transactions = batch.transaction_ids.len(),
            "creating batch"
        );
        let path = self.batch_path().to_owned();
        let created: MaybeWrapped<BatchResponse> = self.post(&path, batch).await?;
        Ok(created.into_inner())
    }

    /// `GET /batch/list?page&perPage`
    pub async fn list_batches(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<BatchResponse>, Error> {
        let params = [("page", page.to_string()), ("perPage", per_page.to_string())];
        self.get_page("batch/list", &params).await
    }
}
