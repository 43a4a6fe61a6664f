//! HTTP transport glue
//!
//! The axum layer is intentionally thin: a single fallback handler
//! feeds every request path into the core route table and maps
//! registry errors onto status codes. No failure escapes the
//! per-request boundary.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Router;

use gitreg_core::error::{RegistryError, Result};

use crate::routes::{PathParams, Route, RouteTable};
use crate::service::RegistryService;

#[derive(Clone)]
struct AppState {
    service: Arc<RegistryService>,
    routes: Arc<RouteTable>,
}

/// Build the axum router around a registry service
pub fn build_router(service: Arc<RegistryService>) -> Result<Router> {
    let state = AppState {
        service,
        routes: Arc::new(RouteTable::registry()?),
    };
    Ok(Router::new().fallback(dispatch).with_state(state))
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_owned();
    let query = request.uri().query().map(str::to_owned);

    let Some((route, params)) = state.routes.dispatch(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match handle(&state.service, route, &params, query.as_deref()).await {
        Ok(response) => response,
        Err(error) => error_response(&path, error),
    }
}

async fn handle(
    service: &RegistryService,
    route: Route,
    params: &PathParams,
    query: Option<&str>,
) -> Result<Response> {
    let param = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();
    let remote = param("remote");

    match route {
        Route::Liveness => {
            service.liveness(remote).await?;
            Ok(StatusCode::OK.into_response())
        }
        Route::AllPackages => {
            let doc = service.all_packages(remote).await?;
            Ok(Json(doc).into_response())
        }
        Route::Packument => {
            let doc = service.packument(remote, param("package")).await?;
            Ok(Json(doc).into_response())
        }
        Route::VersionDoc => {
            let doc = service
                .version_doc(remote, param("package"), param("version"))
                .await?;
            Ok(Json(doc).into_response())
        }
        Route::Search => {
            let query = parse_query(query);
            let doc = service
                .search(
                    remote,
                    query.get("text").map(String::as_str),
                    query.get("size").map(String::as_str),
                )
                .await?;
            Ok(Json(doc).into_response())
        }
        Route::Download => {
            let (content_type, stream) = service
                .download(remote, param("package"), param("version"), param("format"))
                .await?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from_stream(stream.into_byte_stream()))
                .map_err(|e| RegistryError::Other(e.to_string()))
        }
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Map a registry error onto a status code
///
/// NotFound is the one expected client-facing failure; BadRequest
/// covers unparsable query parameters. Everything else is an internal
/// failure, logged and answered with 500.
fn error_response(path: &str, error: RegistryError) -> Response {
    match error {
        RegistryError::NotFound { what } => {
            tracing::debug!(path, what, "not found");
            StatusCode::NOT_FOUND.into_response()
        }
        RegistryError::BadRequest { message } => {
            tracing::debug!(path, message, "bad request");
            StatusCode::BAD_REQUEST.into_response()
        }
        error => {
            tracing::error!(path, %error, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
