// Inventory backend HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, list-envelope unwrapping and
// error-body parsing. Endpoint groups (tags, transactions, batches) are
// implemented as inherent methods in sibling files.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::models::{FieldStyle, ListEnvelope, Page};
use crate::error::Error;
use crate::transport::TransportConfig;

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl ErrorResponse {
    // Validation pipes return `message` as an array of strings.
    fn text(self) -> Option<String> {
        match self.message? {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            other => Some(other.to_string()),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the inventory backend REST API.
///
/// All list endpoints are unwrapped into [`Page<T>`]; single-object
/// endpoints tolerate an optional `data` wrapper.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    field_style: FieldStyle,
    batch_path: String,
    timeout_secs: u64,
}

impl BackendClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `base_url` using the shared transport settings.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut client = Self::from_reqwest(base_url, http)?;
        client.timeout_secs = transport.timeout_secs();
        Ok(client)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            field_style: FieldStyle::default(),
            batch_path: "batch".into(),
            timeout_secs: TransportConfig::default().timeout_secs(),
        })
    }

    /// Key spelling used for the transaction-add body.
    #[must_use]
    pub fn with_field_style(mut self, style: FieldStyle) -> Self {
        self.field_style = style;
        self
    }

    /// Path of the batch-create endpoint (`batch` or `batch/add`).
    #[must_use]
    pub fn with_batch_path(mut self, path: impl Into<String>) -> Self {
        let path: String = path.into();
        self.batch_path = path.trim_matches('/').to_owned();
        self
    }

    /// Ensure the base path ends with `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn field_style(&self) -> FieldStyle {
        self.field_style
    }

    pub(crate) fn batch_path(&self) -> &str {
        &self.batch_path
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_response(resp).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_response(resp).await
    }

    /// GET a list endpoint and strip the `{ data: { data, meta } }` envelope.
    pub(crate) async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Page<T>, Error> {
        let envelope: ListEnvelope<T> = self.get_with_params(path, params).await?;
        Ok(envelope.data)
    }

    // ── Response handling ────────────────────────────────────────────

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview = &body[..body.len().min(200)];
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(ErrorResponse::text)
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            });

        Error::Api {
            status: status.as_u16(),
            message,
        }
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Collect every page into a single `Vec<T>`, starting at page 1.
    pub async fn paginate_all<T, F, Fut>(&self, per_page: u32, fetch: F) -> Result<Vec<T>, Error>
    where
        F: Fn(u32, u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, Error>>,
    {
        let mut all = Vec::new();
        let mut page_no: u32 = 1;

        loop {
            let page = fetch(page_no, per_page).await?;
            let received = page.data.len();
            let pages = page.meta.page_count(per_page);
            all.extend(page.data);

            if received == 0
                || u64::from(page_no) >= pages
                || u64::try_from(all.len()).unwrap_or(u64::MAX) >= page.meta.total
            {
                break;
            }

            page_no += 1;
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let client =
            BackendClient::from_reqwest("http://localhost:9001/api", reqwest::Client::new());
        let client = client.ok();
        assert_eq!(
            client.map(|c| c.base_url().as_str().to_owned()).as_deref(),
            Some("http://localhost:9001/api/")
        );
    }

    #[test]
    fn batch_path_is_trimmed() {
        let client = BackendClient::from_reqwest("http://localhost:9001", reqwest::Client::new())
            .map(|c| c.with_batch_path("/batch/add/"));
        assert_eq!(client.ok().as_ref().map(BackendClient::batch_path), Some("batch/add"));
    }

    #[test]
    fn array_messages_are_joined() {
        let err: ErrorResponse =
            serde_json::from_str(r#"{"message":["name should not be empty","bad id"]}"#)
                .unwrap_or(ErrorResponse { message: None });
        assert_eq!(
            err.text().as_deref(),
            Some("name should not be empty; bad id")
        );
    }
}
