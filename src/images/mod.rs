/// Listing image storage
///
/// Images are stored as files through an `ImageBackend`; their metadata
/// (order, main flag, owning listing) lives in the `listing_image` table.
pub mod disk;
mod manager;

pub use disk::DiskImageBackend;
pub use manager::ImageManager;

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image storage backend
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Store an image under `file_name`
    async fn put(&self, file_name: &str, data: Vec<u8>) -> AppResult<()>;

    async fn get(&self, file_name: &str) -> AppResult<Option<Vec<u8>>>;

    /// Remove an image; missing files are not an error
    async fn delete(&self, file_name: &str) -> AppResult<()>;

    async fn exists(&self, file_name: &str) -> AppResult<bool>;

    async fn size(&self, file_name: &str) -> AppResult<Option<u64>>;
}

/// Accepted upload content types and the extension used on disk
pub const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let content_type = content_type.trim().to_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(|e| e.to_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Image attached to a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingImage {
    pub id: i64,
    pub listing_id: i64,
    pub url: String,
    pub file_name: String,
    pub original_name: Option<String>,
    pub content_type: String,
    pub size: i64,
    pub display_order: i64,
    pub is_main: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// Photo allowance of a listing under its owner's plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLimits {
    pub current: i64,
    pub max: i64,
    pub remaining: i64,
    pub plan: crate::plans::Plan,
}

/// Totals across all stored images
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStorageStats {
    pub total_images: i64,
    pub total_bytes: i64,
}

/// Public URL of a stored image
pub fn image_url(file_name: &str) -> String {
    format!("/api/images/view/{}", file_name)
}
