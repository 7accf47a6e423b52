//! Error taxonomy for the query pipeline and its HTTP error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0}")]
    MalformedRequest(String),
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("chain ID {0} not supported")]
    UnsupportedChain(String),
    #[error("unsupported parameter type: {0}")]
    UnsupportedType(String),
    #[error("invalid {kind}: {value}")]
    InvalidParameter { kind: &'static str, value: String },
    #[error("failed to pack values: {0}")]
    Encoding(String),
    #[error("custom json-rpc endpoints are disabled")]
    CustomRpcDisabled,
    #[error("client connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },
    #[error("{operation} failed: rpc error {code}: {message}")]
    Rpc {
        operation: &'static str,
        code: i64,
        message: String,
    },
    #[error("{operation} failed: invalid rpc response: {message}")]
    InvalidRpcResponse {
        operation: &'static str,
        message: String,
    },
    #[error("unexpected rpc result type, expected {expected}")]
    RpcResultTypeMismatch { expected: &'static str },
    #[error("failed to decode hex: {value}")]
    HexDecodeFailed { value: String },
    #[error("{0}")]
    Internal(String),
}

impl QueryError {
    /// Status code for each error kind. Anything caused by the caller's input
    /// is a 400, everything past the point of talking to the node is a 500.
    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::MalformedRequest(_)
            | QueryError::MissingFields(_)
            | QueryError::UnsupportedChain(_)
            | QueryError::UnsupportedType(_)
            | QueryError::InvalidParameter { .. }
            | QueryError::Encoding(_)
            | QueryError::CustomRpcDisabled => StatusCode::BAD_REQUEST,
            QueryError::Connection { .. }
            | QueryError::Rpc { .. }
            | QueryError::InvalidRpcResponse { .. }
            | QueryError::RpcResultTypeMismatch { .. }
            | QueryError::HexDecodeFailed { .. }
            | QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach the name of the operation that raised this error.
    pub fn raised_in(self, origin: &str) -> ApiError {
        ApiError::from_query_error(&self, origin)
    }
}

/// JSON error body returned to HTTP callers.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    pub details: String,
    pub origin: String,
}

impl ApiError {
    pub fn from_query_error(err: &QueryError, origin: &str) -> Self {
        let status = err.status();
        Self {
            code: status.as_u16(),
            message: summary(status).to_string(),
            details: err.to_string(),
            origin: origin.to_string(),
        }
    }

    pub fn internal(details: impl Into<String>, origin: &str) -> Self {
        Self::from_query_error(&QueryError::Internal(details.into()), origin)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn summary(status: StatusCode) -> &'static str {
    if status == StatusCode::BAD_REQUEST {
        "Malformed request"
    } else {
        "Internal server error"
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error (Code: {}, Message: {}): {}",
            self.code, self.message, self.details
        )
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_bad_requests() {
        let errors = [
            QueryError::MalformedRequest("x".into()),
            QueryError::MissingFields(vec!["chain-id".into()]),
            QueryError::UnsupportedChain("999999".into()),
            QueryError::UnsupportedType("int8".into()),
            QueryError::InvalidParameter {
                kind: "uint256",
                value: "abc".into(),
            },
            QueryError::Encoding("overflow".into()),
            QueryError::CustomRpcDisabled,
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn node_errors_are_internal() {
        let err = QueryError::Rpc {
            operation: "eth_call",
            code: 3,
            message: "execution reverted".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "eth_call failed: rpc error 3: execution reverted"
        );
    }

    #[test]
    fn api_error_shape() {
        let err = QueryError::MissingFields(vec!["chain-id".into(), "contract-address".into()])
            .raised_in("handler::ext_code_size");
        assert_eq!(err.code, 400);
        assert_eq!(err.message, "Malformed request");
        assert_eq!(err.details, "Missing fields: chain-id, contract-address");
        assert_eq!(err.origin, "handler::ext_code_size");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 400);
        assert!(json.get("origin").is_some());
    }

    #[test]
    fn internal_error_summary() {
        let err = ApiError::internal("boom", "server");
        assert_eq!(err.code, 500);
        assert_eq!(err.message, "Internal server error");
        assert_eq!(err.details, "boom");
    }
}
