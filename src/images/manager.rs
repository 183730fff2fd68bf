/// Image metadata and upload rules
use crate::{
    error::{is_busy, AppError, AppResult},
    images::{
        content_type_for, extension_for, image_url, ImageBackend, ImageStorageStats, ListingImage,
        UploadLimits,
    },
    metrics,
    plans::{EntitlementPolicy, Plan, UsageSnapshot},
};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const IMAGE_COLUMNS: &str = "id, listing_id, url, file_name, original_name, content_type, size, \
     display_order, is_main, uploaded_at";

/// Attempts before a contended upload gives up
const INSERT_ATTEMPTS: u64 = 8;

/// Image manager
pub struct ImageManager {
    db: SqlitePool,
    backend: Arc<dyn ImageBackend>,
    policy: Arc<EntitlementPolicy>,
    upload_limit: usize,
}

impl ImageManager {
    pub fn new(
        db: SqlitePool,
        backend: Arc<dyn ImageBackend>,
        policy: Arc<EntitlementPolicy>,
        upload_limit: usize,
    ) -> Self {
        Self {
            db,
            backend,
            policy,
            upload_limit,
        }
    }

    /// Store an image for a listing owned by the caller.
    ///
    /// The first image of a listing always becomes its main image.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        listing_id: i64,
        caller_id: Option<i64>,
        original_name: Option<String>,
        content_type: &str,
        data: Vec<u8>,
        make_main: bool,
        now: DateTime<Utc>,
    ) -> AppResult<ListingImage> {
        let owner_id = self.owned_listing(listing_id, caller_id).await?;

        if data.is_empty() {
            return Err(AppError::Validation("Image is empty".to_string()));
        }
        if data.len() > self.upload_limit {
            return Err(AppError::Validation(format!(
                "Image exceeds the {} byte limit",
                self.upload_limit
            )));
        }

        let extension = extension_for(content_type).ok_or_else(|| {
            AppError::Validation(format!("Unsupported image type: {}", content_type))
        })?;

        match image::guess_format(&data) {
            Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP) => {}
            _ => {
                return Err(AppError::Validation(
                    "File content is not a supported image".to_string(),
                ))
            }
        }

        let plan = self.owner_plan(owner_id, now).await?;
        let max = i64::from(self.policy.max_photos(plan));
        let current = self.count_for_listing(listing_id).await?;
        if current >= max {
            return Err(AppError::Validation(format!(
                "Plan {} allows {} photos per listing",
                plan.display_name(),
                max
            )));
        }

        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let size = data.len() as i64;
        self.backend.put(&file_name, data).await?;

        let inserted = self
            .insert_within_limit(listing_id, &file_name, original_name, content_type, size, make_main, max, now)
            .await;

        let id = match inserted {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.discard(&file_name).await;
                return Err(AppError::Validation(format!(
                    "Plan {} allows {} photos per listing",
                    plan.display_name(),
                    max
                )));
            }
            Err(e) => {
                self.discard(&file_name).await;
                return Err(e);
            }
        };

        metrics::record_image_uploaded(extension);
        info!("Stored image {} for listing {} ({} bytes)", file_name, listing_id, size);

        self.get(id).await
    }

    async fn discard(&self, file_name: &str) {
        if let Err(cleanup) = self.backend.delete(file_name).await {
            warn!("Failed to remove orphaned image {}: {}", file_name, cleanup);
        }
    }

    /// Insert the image row unless the listing already holds `max` images.
    ///
    /// The conditional insert is the first statement of the transaction, so
    /// SQLite takes the write lock before counting and concurrent uploads
    /// are serialized. Returns `None` when the limit is reached.
    #[allow(clippy::too_many_arguments)]
    async fn insert_within_limit(
        &self,
        listing_id: i64,
        file_name: &str,
        original_name: Option<String>,
        content_type: &str,
        size: i64,
        make_main: bool,
        max: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        for attempt in 1..=INSERT_ATTEMPTS {
            let mut tx = self.db.begin().await?;

            let outcome = async {
                let result = sqlx::query(
                    r#"
                    INSERT INTO listing_image (listing_id, url, file_name, original_name, content_type,
                                               size, display_order, is_main, uploaded_at)
                    SELECT ?, ?, ?, ?, ?, ?,
                           (SELECT COALESCE(MAX(display_order), 0) + 1 FROM listing_image WHERE listing_id = ?),
                           (? OR NOT EXISTS (SELECT 1 FROM listing_image WHERE listing_id = ?)),
                           ?
                    WHERE (SELECT COUNT(*) FROM listing_image WHERE listing_id = ?) < ?
                    "#,
                )
                .bind(listing_id)
                .bind(image_url(file_name))
                .bind(file_name)
                .bind(original_name.clone())
                .bind(content_type.trim().to_lowercase())
                .bind(size)
                .bind(listing_id)
                .bind(make_main)
                .bind(listing_id)
                .bind(now)
                .bind(listing_id)
                .bind(max)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Ok::<_, AppError>(None);
                }
                let id = result.last_insert_rowid();

                if make_main {
                    sqlx::query("UPDATE listing_image SET is_main = 0 WHERE listing_id = ? AND id != ?")
                        .bind(listing_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }

                Ok(Some(id))
            }
            .await;

            match outcome {
                Ok(Some(id)) => {
                    tx.commit().await?;
                    return Ok(Some(id));
                }
                Ok(None) => {
                    tx.rollback().await?;
                    debug!("Listing {} already holds {} images", listing_id, max);
                    return Ok(None);
                }
                Err(AppError::Database(e)) if is_busy(&e) => {
                    tx.rollback().await.ok();
                    debug!("Database busy storing image for listing {}, attempt {}", listing_id, attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(10 * attempt)).await;
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }

        Err(AppError::Conflict(
            "Too many concurrent uploads, try again".to_string(),
        ))
    }

    pub async fn get(&self, image_id: i64) -> AppResult<ListingImage> {
        let row = sqlx::query(&format!("SELECT {} FROM listing_image WHERE id = ?", IMAGE_COLUMNS))
            .bind(image_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))?;

        Ok(parse_image(&row))
    }

    /// Images of a listing in display order
    pub async fn list(&self, listing_id: i64) -> AppResult<Vec<ListingImage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listing_image WHERE listing_id = ? ORDER BY display_order, id",
            IMAGE_COLUMNS
        ))
        .bind(listing_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_image).collect())
    }

    pub async fn main_image(&self, listing_id: i64) -> AppResult<Option<ListingImage>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listing_image WHERE listing_id = ? ORDER BY is_main DESC, display_order, id LIMIT 1",
            IMAGE_COLUMNS
        ))
        .bind(listing_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.as_ref().map(parse_image))
    }

    /// Remove an image; the next image in order becomes main if needed
    pub async fn delete(&self, image_id: i64, caller_id: Option<i64>) -> AppResult<()> {
        let image = self.get(image_id).await?;
        self.owned_listing(image.listing_id, caller_id).await?;

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM listing_image WHERE id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;

        if image.is_main {
            sqlx::query(
                r#"
                UPDATE listing_image SET is_main = 1
                WHERE id = (SELECT id FROM listing_image WHERE listing_id = ?
                            ORDER BY display_order, id LIMIT 1)
                "#,
            )
            .bind(image.listing_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.backend.delete(&image.file_name).await?;
        debug!("Deleted image {} of listing {}", image_id, image.listing_id);
        Ok(())
    }

    /// Make one image the only main image of its listing
    pub async fn set_main(&self, image_id: i64, caller_id: Option<i64>) -> AppResult<ListingImage> {
        let image = self.get(image_id).await?;
        self.owned_listing(image.listing_id, caller_id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE listing_image SET is_main = (id = ?) WHERE listing_id = ?")
            .bind(image_id)
            .bind(image.listing_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ListingImage {
            is_main: true,
            ..image
        })
    }

    /// Apply a new display order. `ordered_ids` must name images of this listing.
    pub async fn reorder(
        &self,
        listing_id: i64,
        caller_id: Option<i64>,
        ordered_ids: &[i64],
    ) -> AppResult<Vec<ListingImage>> {
        self.owned_listing(listing_id, caller_id).await?;

        let mut tx = self.db.begin().await?;
        for (position, image_id) in ordered_ids.iter().enumerate() {
            let result = sqlx::query(
                "UPDATE listing_image SET display_order = ? WHERE id = ? AND listing_id = ?",
            )
            .bind(position as i64 + 1)
            .bind(image_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(AppError::Validation(format!(
                    "Image {} does not belong to listing {}",
                    image_id, listing_id
                )));
            }
        }
        tx.commit().await?;

        self.list(listing_id).await
    }

    /// Photo allowance of a listing under its owner's current plan
    pub async fn upload_limits(&self, listing_id: i64, now: DateTime<Utc>) -> AppResult<UploadLimits> {
        let owner_id = self.listing_owner(listing_id).await?;
        let plan = self.owner_plan(owner_id, now).await?;
        let max = i64::from(self.policy.max_photos(plan));
        let current = self.count_for_listing(listing_id).await?;

        Ok(UploadLimits {
            current,
            max,
            remaining: (max - current).max(0),
            plan,
        })
    }

    /// Raw bytes and content type of a stored image
    pub async fn read(&self, file_name: &str) -> AppResult<(Vec<u8>, &'static str)> {
        let data = self
            .backend
            .get(file_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", file_name)))?;

        Ok((data, content_type_for(file_name)))
    }

    pub async fn storage_stats(&self) -> AppResult<ImageStorageStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_images, COALESCE(SUM(size), 0) AS total_bytes FROM listing_image",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(ImageStorageStats {
            total_images: row.get("total_images"),
            total_bytes: row.get("total_bytes"),
        })
    }

    async fn count_for_listing(&self, listing_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listing_image WHERE listing_id = ?")
            .bind(listing_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn listing_owner(&self, listing_id: i64) -> AppResult<i64> {
        sqlx::query_scalar("SELECT owner_id FROM listing WHERE id = ?")
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))
    }

    async fn owned_listing(&self, listing_id: i64, caller_id: Option<i64>) -> AppResult<i64> {
        let owner_id = self.listing_owner(listing_id).await?;
        match caller_id {
            Some(caller) if caller == owner_id => Ok(owner_id),
            _ => Err(AppError::Forbidden(format!(
                "Listing {} does not belong to the caller",
                listing_id
            ))),
        }
    }

    async fn owner_plan(&self, owner_id: i64, now: DateTime<Utc>) -> AppResult<Plan> {
        let row = sqlx::query(
            "SELECT plan, plan_expires_at, published_this_month, usage_month FROM account WHERE id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", owner_id)))?;

        let stored_plan: String = row.get("plan");
        let usage = UsageSnapshot {
            plan: Plan::from_code(&stored_plan),
            stored_plan,
            plan_expires_at: row.get("plan_expires_at"),
            published_this_month: row.get("published_this_month"),
            usage_month: row.get("usage_month"),
        };

        Ok(self.policy.effective_plan(&usage, now))
    }
}

fn parse_image(row: &SqliteRow) -> ListingImage {
    ListingImage {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        url: row.get("url"),
        file_name: row.get("file_name"),
        original_name: row.get("original_name"),
        content_type: row.get("content_type"),
        size: row.get("size"),
        display_order: row.get("display_order"),
        is_main: row.get("is_main"),
        uploaded_at: row.get("uploaded_at"),
    }
}
