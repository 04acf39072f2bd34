use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::{CoreError, Resource};

pub type StandardResponse = Result<Response, CoreError>;

pub fn success(body: impl Serialize) -> StandardResponse {
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub fn created(body: impl Serialize) -> StandardResponse {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub fn message(msg: &str) -> StandardResponse {
    success(json!({ "message": msg }))
}

pub fn no_content() -> StandardResponse {
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub fn err_not_found(resource: Resource) -> StandardResponse {
    Err(CoreError::NotFound(resource))
}

/// Unwraps a JSON body, reporting a malformed one as a validation failure.
pub fn json_body<T>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, CoreError> {
    match body {
        Ok(Json(t)) => Ok(t),
        Err(rejection) => {
            tracing::debug!(%rejection, "rejected request body");
            Err(CoreError::validation("body", "malformed JSON body"))
        }
    }
}
