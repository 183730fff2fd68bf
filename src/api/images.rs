/// Listing photo upload and serving
///
/// Uploads take the raw image as the request body with its Content-Type
/// header, like a blob upload.
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::AppResult,
    images::{ImageStorageStats, ListingImage, UploadLimits},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/images/upload/:listing_id", post(upload))
        .route("/api/images/listing/:listing_id", get(list_images))
        .route("/api/images/listing/:listing_id/main", get(main_image))
        .route("/api/images/listing/:listing_id/reorder", put(reorder))
        .route("/api/images/listing/:listing_id/upload-limits", get(upload_limits))
        .route("/api/images/view/:file_name", get(view))
        .route("/api/images/stats", get(storage_stats))
        .route("/api/images/:image_id", delete(delete_image))
        .route("/api/images/:image_id/set-main", post(set_main))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    #[serde(default)]
    main: bool,
    /// Client-side file name, kept for display only
    name: Option<String>,
}

async fn upload(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ListingImage>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let image = ctx
        .images
        .upload(
            listing_id,
            Some(auth.account_id),
            params.name,
            content_type,
            body.to_vec(),
            params.main,
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(image)))
}

async fn list_images(
    State(ctx): State<AppContext>,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<Vec<ListingImage>>> {
    Ok(Json(ctx.images.list(listing_id).await?))
}

async fn main_image(
    State(ctx): State<AppContext>,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<Option<ListingImage>>> {
    Ok(Json(ctx.images.main_image(listing_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    image_ids: Vec<i64>,
}

async fn reorder(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> AppResult<Json<Vec<ListingImage>>> {
    let images = ctx
        .images
        .reorder(listing_id, Some(auth.account_id), &req.image_ids)
        .await?;
    Ok(Json(images))
}

async fn upload_limits(
    State(ctx): State<AppContext>,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<UploadLimits>> {
    Ok(Json(ctx.images.upload_limits(listing_id, Utc::now()).await?))
}

/// Serve a stored image
///
/// File names are random and never reused, so the name doubles as the ETag.
async fn view(
    State(ctx): State<AppContext>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let etag = format!("\"{}\"", file_name);
    let cache_control = "public, max-age=31536000, immutable";

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if not_modified {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control.to_string())],
        )
            .into_response());
    }

    let (data, content_type) = ctx.images.read(&file_name).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, cache_control.to_string()),
        ],
        data,
    )
        .into_response())
}

async fn storage_stats(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
) -> AppResult<Json<ImageStorageStats>> {
    Ok(Json(ctx.images.storage_stats().await?))
}

async fn delete_image(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(image_id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.images.delete(image_id, Some(auth.account_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_main(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(image_id): Path<i64>,
) -> AppResult<Json<ListingImage>> {
    Ok(Json(ctx.images.set_main(image_id, Some(auth.account_id)).await?))
}
