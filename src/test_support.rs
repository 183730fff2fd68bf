//! Fixtures shared by unit tests
use crate::{
    db,
    images::{DiskImageBackend, ImageManager},
    listings::{ListingDraft, ListingManager, ListingStatus},
    plans::{month_key, EntitlementPolicy, Plan},
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// PNG signature followed by an IHDR chunk header; enough for format sniffing
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
];

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

pub struct ListingFixture {
    pub pool: SqlitePool,
    pub listings: ListingManager,
    pub images: ImageManager,
    _dir: TempDir,
}

pub async fn listing_fixture() -> ListingFixture {
    let pool = db::memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(DiskImageBackend::new(dir.path().to_path_buf()));
    let policy = Arc::new(EntitlementPolicy::default());

    ListingFixture {
        listings: ListingManager::new(pool.clone(), policy.clone(), backend.clone()),
        images: ImageManager::new(pool.clone(), backend, policy, 1024 * 1024),
        pool,
        _dir: dir,
    }
}

/// Insert an account directly, bypassing password hashing
pub async fn seed_account(pool: &SqlitePool, phone: &str, plan: Plan, now: DateTime<Utc>) -> i64 {
    let expires_at = plan.is_paid().then(|| now + chrono::Duration::days(30));

    sqlx::query(
        r#"
        INSERT INTO account (name, phone, password_hash, plan, plan_expires_at,
                             published_this_month, usage_month, is_active, is_admin, created_at)
        VALUES ('Seller', ?, 'not-a-hash', ?, ?, 0, ?, 1, 0, ?)
        "#,
    )
    .bind(phone)
    .bind(plan.as_str())
    .bind(expires_at)
    .bind(month_key(now))
    .bind(now)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn seed_category(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query("INSERT INTO category (name, display_order, is_active, created_at) VALUES (?, 0, 1, ?)")
        .bind(name)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn set_status(pool: &SqlitePool, listing_id: i64, status: ListingStatus) {
    sqlx::query("UPDATE listing SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(listing_id)
        .execute(pool)
        .await
        .unwrap();
}

pub fn draft(category_id: i64, title: &str) -> ListingDraft {
    ListingDraft {
        category_id,
        title: title.to_string(),
        description: "Good condition, barely used".to_string(),
        price: Some(25000),
        city: "Douala".to_string(),
        quarter: Some("Akwa".to_string()),
        ..Default::default()
    }
}
