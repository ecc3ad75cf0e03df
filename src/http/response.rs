//! Response helpers.
//!
//! Every non-2xx response carries the same JSON shape, with the trace id
//! embedded so a caller can look the failure up in the tracing backend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::simulation::payload::ErrorBody;

/// Build a JSON error response.
pub fn json_error(status: StatusCode, error: &str, trace_id: String, details: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            trace_id,
            details: details.to_string(),
        }),
    )
        .into_response()
}
