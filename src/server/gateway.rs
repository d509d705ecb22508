use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use tower::limit::ConcurrencyLimitLayer;

use crate::domain::{compile_domain, search_predicate, Predicate};
use crate::server::SessionMap;
use crate::{
    DeleteReceipt, EntityRecord, EntityStore, Error, ErrorBody, Page, Principal, Result,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

/// Shared, request-independent gateway state. The gateway itself is
/// stateless; everything mutable lives behind the store and session map.
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub sessions: Arc<SessionMap>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            sessions: Arc::new(SessionMap::new()),
        }
    }
}

/// An error plus the HTTP status it maps to. Serializes as the uniform
/// `{error, success: false}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::BadRequest(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(&self.message))).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        bearer_token(parts)
            .and_then(|token| state.sessions.resolve(token))
            .ok_or_else(|| ApiError::from(Error::Unauthorized))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    offset: Option<i64>,
    search: Option<String>,
    domain: Option<String>,
    fields: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldsParams {
    fields: Option<String>,
}

/// Builds the combined predicate for a list request. Runs entirely before
/// any store call, so a rejected filter never reaches the backend.
fn list_predicate(params: &ListParams) -> Result<Predicate> {
    let mut parts = Vec::new();
    if let Some(raw) = params.domain.as_deref() {
        let tokens: Value = serde_json::from_str(raw)
            .map_err(|_| Error::BadRequest("invalid domain format".to_string()))?;
        let tokens = tokens
            .as_array()
            .ok_or_else(|| Error::BadRequest("domain must be a JSON list".to_string()))?;
        parts.push(compile_domain(tokens)?);
    }
    if let Some(text) = params.search.as_deref() {
        let text = text.trim();
        if !text.is_empty() {
            parts.push(search_predicate(text));
        }
    }
    Ok(Predicate::all(parts))
}

fn parse_fields(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;
    let fields: Vec<String> = raw
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Projects a record down to the requested fields. `id` is always kept.
fn project(record: EntityRecord, fields: &[String]) -> EntityRecord {
    record
        .into_iter()
        .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
        .collect()
}

fn parse_payload(body: &str) -> Result<EntityRecord> {
    let value: Value = serde_json::from_str(body)
        .map_err(|_| Error::BadRequest("invalid JSON data".to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::BadRequest(
            "payload must be a JSON object".to_string(),
        )),
    }
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Json<Value> {
    let models = state.store.models().await;
    Json(json!({ "models": models }))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(model): Path<String>,
    Query(params): Query<ListParams>,
) -> std::result::Result<Json<Page<EntityRecord>>, ApiError> {
    if !state.store.has_model(&model).await {
        return Err(Error::NotFound(format!("model '{}' is not registered", model)).into());
    }

    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit > MAX_PAGE_SIZE {
        return Err(
            Error::BadRequest(format!("limit must not exceed {}", MAX_PAGE_SIZE)).into(),
        );
    }
    let offset = params.offset.unwrap_or(0).max(0) as usize;
    let predicate = list_predicate(&params)?;
    let fields = parse_fields(params.fields.as_deref());

    // Two store calls on purpose: `total` reflects the full match set, not
    // the window. The pair is not isolated against concurrent writes.
    let total = state
        .store
        .search_count(&principal, &model, &predicate)
        .await?;
    let mut items = state
        .store
        .search(&principal, &model, &predicate, limit, offset)
        .await?;
    if let Some(fields) = &fields {
        items = items.into_iter().map(|r| project(r, fields)).collect();
    }

    Ok(Json(Page {
        items,
        total,
        limit,
        offset,
        model,
    }))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((model, id)): Path<(String, i64)>,
    Query(params): Query<FieldsParams>,
) -> std::result::Result<Json<EntityRecord>, ApiError> {
    let record = state
        .store
        .read(&principal, &model, id)
        .await
        .map_err(|e| match e {
            // Single-record reads never reveal whether a forbidden record
            // exists.
            Error::Forbidden => {
                Error::NotFound(format!("record {} not found in model '{}'", id, model))
            }
            e => e,
        })?;
    let record = match parse_fields(params.fields.as_deref()) {
        Some(fields) => project(record, &fields),
        None => record,
    };
    Ok(Json(record))
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(model): Path<String>,
    body: String,
) -> std::result::Result<(StatusCode, Json<EntityRecord>), ApiError> {
    let values = parse_payload(&body)?;
    let record = state.store.create(&principal, &model, values).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((model, id)): Path<(String, i64)>,
    body: String,
) -> std::result::Result<Json<EntityRecord>, ApiError> {
    let values = parse_payload(&body)?;
    let record = state
        .store
        .write(&principal, &model, id, values)
        .await
        .map_err(|e| match e {
            Error::Forbidden => {
                Error::NotFound(format!("record {} not found in model '{}'", id, model))
            }
            e => e,
        })?;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((model, id)): Path<(String, i64)>,
) -> std::result::Result<Json<DeleteReceipt>, ApiError> {
    state.store.unlink(&principal, &model, id).await?;
    Ok(Json(DeleteReceipt {
        deleted_id: id,
        message: "Record deleted successfully".to_string(),
    }))
}

/// Assembles the gateway router with a bounded concurrency limit.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/models", get(list_models))
        .route(
            "/api/v1/models/{model}",
            get(list_records).post(create_record),
        )
        .route(
            "/api/v1/models/{model}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .layer(ConcurrencyLimitLayer::new(100))
        .with_state(state)
}

/// Binds `addr` and serves the gateway until the task is cancelled.
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Modelgate gateway listening on {}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
