//! HTTP surface: routing, CORS, request tracing and the panic trap.

use std::any::Any;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ApiError, QueryError};
use crate::handler::{dispatch, ApiState};
use crate::params::QueryPairs;

pub fn router(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/", get(handle_query).options(preflight))
        .route("/api", get(handle_query).options(preflight))
        .with_state(state);
    with_layers(routes)
}

fn with_layers(routes: Router) -> Router {
    routes
        .layer(CatchPanicLayer::custom(recover_from_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

pub async fn serve(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("query api listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            CONTENT_LENGTH,
            ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
            AUTHORIZATION,
        ])
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_query(
    State(state): State<ApiState>,
    method: Method,
    uri: Uri,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    info!(%method, url = %uri, "API Request");

    let pairs = match query {
        Ok(Query(pairs)) => QueryPairs::new(pairs),
        Err(rejection) => {
            let err = QueryError::MalformedRequest(rejection.body_text())
                .raised_in(concat!(module_path!(), "::handle_query"));
            warn!(details = %err.details, "rejected query string");
            return err.into_response();
        }
    };

    match dispatch(&state, &pairs).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            if err.status().is_server_error() {
                error!(origin = %err.origin, details = %err.details, "query failed");
            } else {
                warn!(origin = %err.origin, details = %err.details, "bad query");
            }
            err.into_response()
        }
    }
}

fn recover_from_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(%details, "Recovered from panic");
    ApiError::internal(details, concat!(module_path!(), "::recover_from_panic")).into_response()
}
