//! Shared fixtures for integration tests
#![allow(dead_code)]

use annonces::{
    db::{self, DatabaseOptions},
    listings::ListingDraft,
    plans::{month_key, Plan},
    AppContext, ServerConfig,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Header of a 1x1 PNG, enough for format sniffing
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
];

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Context over an in-memory database
pub async fn memory_context() -> (AppContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::memory_pool().await.unwrap();
    let config = ServerConfig::for_tests(dir.path().to_path_buf());
    (AppContext::from_pool(config, pool), dir)
}

/// Context over a WAL file database, for tests that race connections
pub async fn file_context() -> (AppContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::for_tests(dir.path().to_path_buf());
    let pool = db::create_pool(&config.storage.database, DatabaseOptions::default())
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    (AppContext::from_pool(config, pool), dir)
}

/// Insert an account without going through password hashing
pub async fn seed_account(
    pool: &SqlitePool,
    phone: &str,
    plan: Plan,
    plan_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO account (name, phone, password_hash, plan, plan_expires_at,
                             published_this_month, usage_month, is_active, is_admin, created_at)
        VALUES ('Seller', ?, 'not-a-hash', ?, ?, 0, ?, 1, 0, ?)
        "#,
    )
    .bind(phone)
    .bind(plan.as_str())
    .bind(plan_expires_at)
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

pub fn draft(category_id: i64, title: &str) -> ListingDraft {
    ListingDraft {
        category_id,
        title: title.to_string(),
        description: "Clean, works perfectly".to_string(),
        price: Some(40000),
        city: "Yaounde".to_string(),
        quarter: Some("Bastos".to_string()),
        ..Default::default()
    }
}
