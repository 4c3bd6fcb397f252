// Tag endpoints

use tracing::debug;

use super::client::BackendClient;
use super::models::{Page, TagResponse};
use crate::error::Error;

impl BackendClient {
    /// One page of tags, optionally filtered by a free-text query.
    ///
    /// `GET /tag/list?page&perPage&q`
    pub async fn list_tags(
        &self,
        page: u32,
        per_page: u32,
        query: Option<&str>,
    ) -> Result<Page<TagResponse>, Error> {
        let mut params = vec![("page", page.to_string()), ("perPage", per_page.to_string())];
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            params.push(("q", q.to_owned()));
        }
        self.get_page("tag/list", &params).await
    }

    /// Every tag across all pages.
    pub async fn list_all_tags(&self, per_page: u32) -> Result<Vec<TagResponse>, Error> {
        self.paginate_all(per_page, |page, per_page| self.list_tags(page, per_page, None))
            .await
    }

    /// Look up a tag by its exact EPC. `None` when the backend has no such tag.
    pub async fn find_tag(&self, epc: &str) -> Result<Option<TagResponse>, Error> {
        debug!(epc, "looking up tag");
        let page = self.list_tags(1, 50, Some(epc)).await?;
        Ok(page
            .data
            .into_iter()
            .find(|t| t.tag.eq_ignore_ascii_case(epc)))
    }
}
