use std::time::Duration;

use futures::future::join_all;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::sdk::mock::{MockBackend, MockConfig};
use crate::sdk::retry::RetryPolicy;
use crate::{DeleteReceipt, EntityRecord, Error, ErrorBody, ListQuery, Page, Result};

/// Client configuration, fixed at construction.
///
/// Mock mode is an explicit per-instance setting rather than a process-wide
/// flag, so different clients in one process can run in different modes.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub session_token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub mock: Option<MockConfig>,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: None,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            mock: None,
        }
    }

    pub fn token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn mock(mut self, mock: MockConfig) -> Self {
        self.mock = Some(mock);
        self
    }
}

/// One failed member of a bulk operation.
#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub index: usize,
    pub error: String,
}

/// Aggregated outcome of a bulk operation. Partial failure is always
/// visible: successes are kept, failures are enumerated by input index.
#[derive(Debug, Clone)]
pub struct BulkReport<T> {
    pub data: Vec<T>,
    pub failures: Vec<BulkFailure>,
}

impl<T> BulkReport<T> {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable failure summary, or `None` when everything succeeded.
    pub fn error_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("#{}: {}", f.index, f.error))
            .collect();
        Some(format!(
            "{} of {} operations failed: {}",
            self.failures.len(),
            self.failures.len() + self.data.len(),
            details.join("; ")
        ))
    }

    fn collect(outcomes: Vec<Result<T>>) -> Self {
        let mut data = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => data.push(value),
                Err(e) => failures.push(BulkFailure {
                    index,
                    error: e.to_string(),
                }),
            }
        }
        Self { data, failures }
    }
}

/// One page of an infinite-scroll traversal.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub items: Vec<EntityRecord>,
    pub has_more: bool,
    pub next_cursor: Option<usize>,
}

#[derive(Deserialize)]
struct ModelsBody {
    models: Vec<String>,
}

/// HTTP client for the gateway's generic model contract.
///
/// Every call goes through the retry policy; in mock mode calls are
/// intercepted before any network I/O.
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    mock: Option<MockBackend>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;
        let mock = config.mock.clone().map(MockBackend::new);
        Ok(Self { config, http, mock })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.config.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        self.config
            .retry
            .run(|| self.execute(method.clone(), path, query, body))
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let mut req = self.http.request(method, self.url(path));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = &self.config.session_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| Error::Internal(format!("invalid response body: {}", e)));
        }

        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status.as_u16()),
        };
        Err(match status.as_u16() {
            400 => Error::BadRequest(message),
            401 => Error::Unauthorized,
            403 => Error::Forbidden,
            404 => Error::NotFound(message),
            s if s >= 500 => Error::Transient(message),
            _ => Error::Internal(message),
        })
    }

    /// Lists the model names the gateway exposes.
    pub async fn models(&self) -> Result<Vec<String>> {
        if let Some(mock) = &self.mock {
            return mock.models().await;
        }
        let body: ModelsBody = self.request(Method::GET, "models", &[], None).await?;
        Ok(body.models)
    }

    /// Windowed list with filtering, search and projection.
    pub async fn list(&self, model: &str, query: &ListQuery) -> Result<Page<EntityRecord>> {
        if let Some(mock) = &self.mock {
            return mock.list(model, query).await;
        }
        let params = query_params(query)?;
        self.request(Method::GET, &format!("models/{}", model), &params, None)
            .await
    }

    /// Sugar for [`list`](Self::list) with only the search text set.
    pub async fn search(&self, model: &str, text: &str) -> Result<Page<EntityRecord>> {
        self.list(model, &ListQuery::default().search(text)).await
    }

    pub async fn get(
        &self,
        model: &str,
        id: i64,
        fields: Option<&[&str]>,
    ) -> Result<EntityRecord> {
        if let Some(mock) = &self.mock {
            let owned: Option<Vec<String>> =
                fields.map(|fs| fs.iter().map(|f| f.to_string()).collect());
            return mock.get(model, id, owned.as_deref()).await;
        }
        let mut params = Vec::new();
        if let Some(fields) = fields {
            params.push(("fields".to_string(), fields.join(",")));
        }
        self.request(Method::GET, &format!("models/{}/{}", model, id), &params, None)
            .await
    }

    pub async fn create(&self, model: &str, values: EntityRecord) -> Result<EntityRecord> {
        if let Some(mock) = &self.mock {
            return mock.create(model, values).await;
        }
        let body = Value::Object(values);
        self.request(
            Method::POST,
            &format!("models/{}", model),
            &[],
            Some(&body),
        )
        .await
    }

    /// Partial update: only the supplied fields change.
    pub async fn update(&self, model: &str, id: i64, values: EntityRecord) -> Result<EntityRecord> {
        if let Some(mock) = &self.mock {
            return mock.update(model, id, values).await;
        }
        let body = Value::Object(values);
        self.request(
            Method::PUT,
            &format!("models/{}/{}", model, id),
            &[],
            Some(&body),
        )
        .await
    }

    pub async fn delete(&self, model: &str, id: i64) -> Result<DeleteReceipt> {
        if let Some(mock) = &self.mock {
            return mock.delete(model, id).await;
        }
        self.request(Method::DELETE, &format!("models/{}/{}", model, id), &[], None)
            .await
    }

    /// One step of an infinite-scroll traversal starting at `cursor`.
    ///
    /// Requests one sentinel item past the page to derive `has_more`
    /// without a separate count round-trip.
    pub async fn scroll(
        &self,
        model: &str,
        query: &ListQuery,
        cursor: usize,
        page_size: usize,
    ) -> Result<ScrollPage> {
        let probe = query.clone().limit(page_size + 1).offset(cursor);
        let page = self.list(model, &probe).await?;
        let mut items = page.items;
        let has_more = items.len() > page_size;
        if has_more {
            items.truncate(page_size);
        }
        Ok(ScrollPage {
            items,
            has_more,
            next_cursor: has_more.then_some(cursor + page_size),
        })
    }

    /// Creates all items concurrently; siblings are never cancelled by a
    /// failing member.
    pub async fn bulk_create(
        &self,
        model: &str,
        items: Vec<EntityRecord>,
    ) -> BulkReport<EntityRecord> {
        let calls: Vec<_> = items
            .into_iter()
            .map(|values| self.create(model, values))
            .collect();
        BulkReport::collect(join_all(calls).await)
    }

    pub async fn bulk_update(
        &self,
        model: &str,
        items: Vec<(i64, EntityRecord)>,
    ) -> BulkReport<EntityRecord> {
        let calls: Vec<_> = items
            .into_iter()
            .map(|(id, values)| self.update(model, id, values))
            .collect();
        BulkReport::collect(join_all(calls).await)
    }

    pub async fn bulk_delete(&self, model: &str, ids: &[i64]) -> BulkReport<DeleteReceipt> {
        let calls: Vec<_> = ids.iter().map(|id| self.delete(model, *id)).collect();
        BulkReport::collect(join_all(calls).await)
    }
}

fn query_params(query: &ListQuery) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(search) = &query.search {
        params.push(("search".to_string(), search.clone()));
    }
    if let Some(domain) = &query.domain {
        params.push(("domain".to_string(), serde_json::to_string(domain)?));
    }
    if let Some(fields) = &query.fields {
        params.push(("fields".to_string(), fields.join(",")));
    }
    Ok(params)
}
