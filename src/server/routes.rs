use crate::images::BatchReport;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::store::ImageStats;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use url::Url;

const DEFAULT_BATCH_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct ProxyQuery {
    url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct BatchRequest {
    limit: Option<usize>,
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Cache a remote image and return where it is served locally
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ProxyQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL parameter required".to_string()))?;

    match Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(ApiError::BadRequest(format!("Invalid image URL: {}", url))),
    }

    let local_url = state
        .images
        .download(&url)
        .await
        .ok_or_else(|| state.internal(format!("Failed to download image: {}", url)))?;

    Ok(Json(json!({
        "localUrl": local_url,
        "originalUrl": url,
    })))
}

/// Download all images of one property (catalog id or external id)
pub async fn download_property_handler(
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state
        .catalog
        .lock()
        .await
        .image_job(&property_id)
        .ok_or_else(|| ApiError::NotFound(format!("Property not found: {}", property_id)))?;

    let images = state
        .images
        .download_for_property(&state.catalog, &job)
        .await
        .map_err(|e| ApiError::from_scout(e, state.expose_errors))?;

    info!(
        "Downloaded {} images for property {}",
        images.local_images.len() + usize::from(images.local_main_image.is_some()),
        job.property_id
    );
    Ok(Json(json!({
        "success": true,
        "propertyId": job.property_id,
        "localMainImage": images.local_main_image,
        "localImagesCount": images.local_images.len(),
    })))
}

/// Cache images for properties that have none yet. The body is optional.
pub async fn download_batch_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let request: BatchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BatchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let limit = request.limit.unwrap_or(DEFAULT_BATCH_LIMIT);

    let report = state.images.download_batch(&state.catalog, limit).await;
    Ok(Json(report))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<ImageStats> {
    Json(state.catalog.lock().await.image_stats())
}
