//! Response assembly
//!
//! Every check answers with its records under a domain key plus an
//! `errors` array: fetch errors first, then the evaluator's reasons.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nodeward_cluster::FanOutResult;
use nodeward_core::HealthReport;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{AppError, AppResult};

/// A check's records with the outcome of evaluating them
#[derive(Debug)]
pub struct CheckResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl CheckResponse {
    /// 200 when every node answered and the evaluation is ok, 417 otherwise.
    pub fn new<T: Serialize>(
        key: &'static str,
        records: &T,
        fetch_error: Option<String>,
        report: HealthReport,
    ) -> AppResult<Self> {
        let degraded = fetch_error.is_some() || !report.is_ok();
        let errors: Vec<String> = fetch_error.into_iter().chain(report.reasons).collect();

        let records = serde_json::to_value(records)
            .map_err(|e| AppError::internal_server_error(format!("Serialization error: {e}")))?;
        let mut body = Map::new();
        body.insert(key.to_string(), records);
        body.insert("errors".to_string(), Value::from(errors));

        Ok(Self {
            status: if degraded {
                StatusCode::EXPECTATION_FAILED
            } else {
                StatusCode::OK
            },
            body: Value::Object(body),
        })
    }
}

impl IntoResponse for CheckResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Evaluate a fan-out result. A result without data is a hard error
/// (503, or 404 for something that does not exist).
pub fn assemble<T: Serialize>(
    key: &'static str,
    result: FanOutResult<Vec<T>>,
    evaluate: impl FnOnce(&[T]) -> HealthReport,
) -> AppResult<CheckResponse> {
    match result.into_parts() {
        (Some(records), error) => {
            let report = evaluate(&records);
            CheckResponse::new(key, &records, error.map(|e| e.to_string()), report)
        }
        (None, Some(error)) => Err(error.into()),
        (None, None) => Err(AppError::internal_server_error("empty fetch result")),
    }
}
