//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    routing::{get, post},
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::Json,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::{InputError, Prediction};
use crate::service::{Context, Dispatcher, RequestItem};

use super::dto::*;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub context: Context,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/predictions/:model_name", post(predict_handler))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB limit for large images
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_error(status: StatusCode, message: &str, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message, code)))
}

/// Health check
async fn ping_handler(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    Json(PingResponse {
        status: "Healthy".to_string(),
        model_ready: state.dispatcher.is_ready(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Build a request item from the HTTP request.
///
/// Multipart fields keep their names; any other body becomes the `body` field.
async fn read_request_item(request: Request) -> Result<RequestItem, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if !is_multipart {
        let body = Bytes::from_request(request, &()).await.map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, &e.body_text(), "READ_ERROR")
        })?;
        return Ok(RequestItem::with_body(body.to_vec()));
    }

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, &e.body_text(), "MULTIPART_ERROR")
    })?;

    let mut item = RequestItem::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, &e.to_string(), "MULTIPART_ERROR")
    })? {
        let name = field.name().unwrap_or("data").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, &e.to_string(), "READ_ERROR")
        })?;
        item.insert(name, bytes.to_vec());
    }

    Ok(item)
}

/// Predict the emotion of the face in one image
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Path(model_name): Path<String>,
    request: Request,
) -> Result<Json<Prediction>, ApiError> {
    if model_name != state.context.model_name {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            &format!("Model not found: {}", model_name),
            "MODEL_NOT_FOUND",
        ));
    }

    let request_id = Uuid::new_v4();
    let start = Instant::now();
    let item = read_request_item(request).await?;

    let dispatcher = state.dispatcher.clone();
    let context = state.context.clone();
    let result = tokio::task::spawn_blocking(move || {
        dispatcher.dispatch(std::slice::from_ref(&item), &context)
    })
    .await
    .map_err(|e| {
        error!("Prediction task {} failed: {}", request_id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "INFERENCE_FAILED")
    })?;

    match result {
        Ok(mut predictions) => {
            info!("Request {} served in {}ms", request_id, start.elapsed().as_millis());
            predictions.pop().map(Json).ok_or_else(|| {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Model returned no prediction", "INFERENCE_FAILED")
            })
        }
        Err(e) => match e.downcast_ref::<InputError>() {
            Some(input_error) => Err(api_error(
                StatusCode::BAD_REQUEST,
                &input_error.to_string(),
                "INVALID_INPUT",
            )),
            None => {
                error!("Request {} failed: {:#}", request_id, e);
                Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("{:#}", e), "INFERENCE_FAILED"))
            }
        },
    }
}
