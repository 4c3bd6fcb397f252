// Transaction endpoints

use tracing::debug;

use super::client::BackendClient;
use super::models::{CreatedId, MaybeWrapped, NewTransaction, Page, TransactionResponse};
use crate::error::Error;

impl BackendClient {
    /// Persist one scan as a transaction and return the backend-issued id.
    ///
    /// `POST /transaction/add`; the id is read at the top level or under `data`.
    pub async fn add_transaction(&self, tx: &NewTransaction) -> Result<i64, Error> {
        debug!(epc = %tx.epc, batch_id = ?tx.batch_id, "adding transaction");
        let body = tx.to_body(self.field_style());
        let created: MaybeWrapped<CreatedId> = self.post("transaction/add", &body).await?;
        Ok(created.into_inner().id)
    }

    /// Transactions belonging to the most recent batch.
    ///
    /// `GET /transaction/list/latest-batch?page&perPage`
    pub async fn list_latest_batch_transactions(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<TransactionResponse>, Error> {
        let params = [("page", page.to_string()), ("perPage", per_page.to_string())];
        self.get_page("transaction/list/latest-batch", &params).await
    }
}
