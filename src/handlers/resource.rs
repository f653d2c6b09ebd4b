//! JSON:API style resource handlers: list, read, create, update, delete on any model in the chain.

use crate::datastore::{ListQuery, ReadRequest, Resource, WriteOutcome, WriteRequest};
use crate::error::AppError;
use crate::hooks::RequestScope;
use crate::response::{collection, created, found};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

/// The `data` member of a request document.
#[derive(Debug)]
struct Document {
    id: Option<String>,
    attributes: Map<String, Value>,
}

fn document(model: &str, body: Value) -> Result<Document, AppError> {
    let Value::Object(mut body) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    let Some(Value::Object(mut data)) = body.remove("data") else {
        return Err(AppError::BadRequest("body must carry a 'data' object".into()));
    };
    match data.remove("type") {
        None => {}
        Some(Value::String(t)) if t == model => {}
        Some(other) => {
            return Err(AppError::Conflict(format!("type {} does not match '{}'", other, model)));
        }
    }
    let id = match data.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => return Err(AppError::BadRequest(format!("id must be a string, got {}", other))),
    };
    let attributes = match data.remove("attributes") {
        None => Map::new(),
        Some(Value::Object(m)) => m,
        Some(_) => return Err(AppError::BadRequest("attributes must be an object".into())),
    };
    Ok(Document { id, attributes })
}

#[utoipa::path(
    get,
    path = "/api/v1/{model}",
    params(("model" = String, Path, description = "Model name, e.g. profiles")),
    responses((status = 200, description = "Matching resources"), (status = 404, description = "Unknown model"))
)]
pub async fn list(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::from_params(params)?;
    let outcome = state.chain.apply_on_read(ReadRequest::Collection { model, query }).await?;
    Ok(collection(outcome.into_many()))
}

#[utoipa::path(
    get,
    path = "/api/v1/{model}/{id}",
    params(("model" = String, Path), ("id" = String, Path)),
    responses((status = 200, description = "The resource"), (status = 404, description = "Not found"))
)]
pub async fn read(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .chain
        .apply_on_read(ReadRequest::Single {
            model: model.clone(),
            id: id.clone(),
        })
        .await?;
    let resource = outcome
        .into_one()
        .ok_or_else(|| AppError::NotFound(format!("{} '{}'", model, id)))?;
    Ok(found(resource))
}

#[utoipa::path(
    post,
    path = "/api/v1/{model}",
    params(("model" = String, Path)),
    request_body = crate::entity::ProfileAttributes,
    responses((status = 201, description = "Created"), (status = 400, description = "Malformed document"))
)]
pub async fn create(
    State(state): State<AppState>,
    Path(model): Path<String>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let doc = document(&model, body)?;
    if doc.id.is_some() {
        return Err(AppError::BadRequest("client-generated ids are not supported".into()));
    }
    let scope = RequestScope::new(uri.path());
    let request = WriteRequest::Create {
        model,
        attributes: doc.attributes,
    };
    match state.chain.apply_on_write(request, &scope).await? {
        WriteOutcome::Created(r) => Ok(created(r)),
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/{model}/{id}",
    params(("model" = String, Path), ("id" = String, Path)),
    request_body = crate::entity::ProfileAttributes,
    responses((status = 200, description = "Updated"), (status = 404, description = "Not found"))
)]
pub async fn update(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let doc = document(&model, body)?;
    if doc.id.as_deref().is_some_and(|body_id| body_id != id) {
        return Err(AppError::BadRequest("id in body does not match the url".into()));
    }
    let scope = RequestScope::new(uri.path());
    let request = WriteRequest::Update {
        model: model.clone(),
        id: id.clone(),
        attributes: doc.attributes,
    };
    match state.chain.apply_on_write(request, &scope).await? {
        WriteOutcome::Updated(Some(r)) => Ok(found(r)),
        WriteOutcome::Updated(None) => Err(AppError::NotFound(format!("{} '{}'", model, id))),
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/{model}/{id}",
    params(("model" = String, Path), ("id" = String, Path)),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found"))
)]
pub async fn delete(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
    uri: Uri,
) -> Result<StatusCode, AppError> {
    let scope = RequestScope::new(uri.path());
    let request = WriteRequest::Delete {
        model: model.clone(),
        id: id.clone(),
    };
    match state.chain.apply_on_write(request, &scope).await? {
        WriteOutcome::Deleted(Some(_)) => Ok(StatusCode::NO_CONTENT),
        WriteOutcome::Deleted(None) => Err(AppError::NotFound(format!("{} '{}'", model, id))),
        other => Err(unexpected(other)),
    }
}

fn unexpected(outcome: WriteOutcome) -> AppError {
    let r: Option<Resource> = match outcome {
        WriteOutcome::Created(r) => Some(r),
        WriteOutcome::Updated(r) | WriteOutcome::Deleted(r) => r,
    };
    AppError::Internal(format!(
        "store returned an outcome of the wrong kind for {}",
        r.map(|r| r.kind).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_jsonapi_document() {
        let doc = document(
            "profiles",
            json!({"data": {"type": "profiles", "attributes": {"name": "Ada"}}}),
        )
        .unwrap();
        assert!(doc.id.is_none());
        assert_eq!(doc.attributes["name"], "Ada");
    }

    #[test]
    fn type_mismatch_conflicts() {
        let err = document("profiles", json!({"data": {"type": "config", "attributes": {}}})).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn missing_data_is_bad_request() {
        assert!(matches!(document("profiles", json!({"name": "Ada"})), Err(AppError::BadRequest(_))));
        assert!(matches!(document("profiles", json!([1, 2])), Err(AppError::BadRequest(_))));
    }
}
