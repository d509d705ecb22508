//! Modelgate is a generic REST gateway for business-entity models.
//!
//! It exposes an open set of named entity collections ("models") over a
//! uniform HTTP CRUD+search contract, without compile-time knowledge of any
//! model's schema. Records are dynamic field maps; the only field the
//! gateway interprets is the numeric `id`.
//!
//! ## Core Components
//! - [`engine`]: The entity store backend (in-memory registry with persistence).
//! - [`domain`]: The filter-expression compiler (whitelisted operators only).
//! - [`server`]: The HTTP gateway daemon (axum).
//! - [`sdk`]: Client libraries with retry, bulk operations and a mock mode.

pub mod domain;
pub mod engine;
pub mod sdk;
pub mod server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Predicate;

/// Errors returned by the gateway, the store backend and the client SDK.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested model or record does not exist (or is not visible).
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed input: bad payload, disallowed filter operator, over-ceiling limit.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// No authenticated principal on the request.
    #[error("unauthorized: no active session")]
    Unauthorized,
    /// The principal is authenticated but lacks permission for the operation.
    #[error("forbidden")]
    Forbidden,
    /// A business-rule constraint was violated; the message passes through verbatim.
    #[error("{0}")]
    Validation(String),
    /// Network failure, timeout or 5xx-class backend failure. Eligible for retry.
    #[error("transient error: {0}")]
    Transient(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure class is worth retrying. Client errors are not
    /// transient: retrying a rejected Create can duplicate side effects.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// A specialized Result type for modelgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Default page size for list queries.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Hard ceiling on the page size; larger requests are rejected.
pub const MAX_PAGE_SIZE: usize = 1000;
/// Name-like fields that free-text search fans out across.
pub const NAME_SEARCH_FIELDS: &[&str] = &["name", "display_name"];

/// A persisted record: an open-ended field map. Contains a numeric `id`
/// once persisted; the gateway never interprets any other field.
pub type EntityRecord = serde_json::Map<String, serde_json::Value>;

/// The authenticated identity on whose behalf a request is authorized.
///
/// Created at session establishment and resolved per request; the gateway
/// only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub uid: i64,
    pub login: String,
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(uid: i64, login: &str, groups: &[&str]) -> Self {
        Self {
            uid,
            login: login.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// The permission class an entity store operation is gated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Create,
    Unlink,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Create => "create",
            AccessMode::Unlink => "unlink",
        };
        f.write_str(s)
    }
}

/// Parameters for a windowed list query.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub search: Option<String>,
    pub domain: Option<Vec<serde_json::Value>>,
    pub fields: Option<Vec<String>>,
}

impl ListQuery {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn domain(mut self, tokens: Vec<serde_json::Value>) -> Self {
        self.domain = Some(tokens);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// The uniform wrapper shape returned for all list-style queries.
///
/// `total` reflects the full match count at query time, independent of the
/// requested window; `items.len() <= limit` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub model: String,
}

impl<T> Page<T> {
    /// Decodes every item into a typed value, preserving the envelope.
    pub fn try_map<U, F>(self, f: F) -> Result<Page<U>>
    where
        F: Fn(T) -> Result<U>,
    {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<U>>>()?;
        Ok(Page {
            items,
            total: self.total,
            limit: self.limit,
            offset: self.offset,
            model: self.model,
        })
    }
}

/// Acknowledgement returned by a successful delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub deleted_id: i64,
    pub message: String,
}

/// The uniform wire shape for every error reaching a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub success: bool,
}

impl ErrorBody {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            success: false,
        }
    }
}

/// The entity store contract the gateway delegates to.
///
/// Every operation is gated by the calling [`Principal`]'s permissions.
/// The store owns concurrency control; no locks are held across calls, so
/// a `search_count` and `search` pair may observe different states under
/// concurrent writes.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Whether a model with this name is registered.
    async fn has_model(&self, model: &str) -> bool;

    /// Lists the registered model names.
    async fn models(&self) -> Vec<String>;

    /// Returns the records matching `predicate`, in stable id order,
    /// windowed by `limit` and `offset`.
    async fn search(
        &self,
        principal: &Principal,
        model: &str,
        predicate: &Predicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EntityRecord>>;

    /// Counts the records matching `predicate`, ignoring any window.
    async fn search_count(
        &self,
        principal: &Principal,
        model: &str,
        predicate: &Predicate,
    ) -> Result<usize>;

    /// Reads a single record by id.
    async fn read(&self, principal: &Principal, model: &str, id: i64) -> Result<EntityRecord>;

    /// Persists a new record and returns it with its assigned id.
    async fn create(
        &self,
        principal: &Principal,
        model: &str,
        values: EntityRecord,
    ) -> Result<EntityRecord>;

    /// Partial update: only the supplied fields are modified.
    async fn write(
        &self,
        principal: &Principal,
        model: &str,
        id: i64,
        values: EntityRecord,
    ) -> Result<EntityRecord>;

    /// Removes a record. Deleting an absent id is an error, not a no-op.
    async fn unlink(&self, principal: &Principal, model: &str, id: i64) -> Result<()>;
}
