/// Per-account favorite listings
use crate::{
    error::{AppError, AppResult},
    listings::{parse_listing, qualified_columns, Listing},
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

/// Favorite manager
pub struct FavoriteManager {
    db: SqlitePool,
}

impl FavoriteManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Add a favorite. Adding one twice is a no-op.
    pub async fn add(&self, account_id: i64, listing_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM listing WHERE id = ?")
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Listing {} not found", listing_id)));
        }

        sqlx::query(
            "INSERT INTO favorite (account_id, listing_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (account_id, listing_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(listing_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        debug!("Account {} favorited listing {}", account_id, listing_id);
        Ok(())
    }

    /// Returns whether a favorite was removed
    pub async fn remove(&self, account_id: i64, listing_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM favorite WHERE account_id = ? AND listing_id = ?")
            .bind(account_id)
            .bind(listing_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_favorite(&self, account_id: i64, listing_id: i64) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM favorite WHERE account_id = ? AND listing_id = ?",
        )
        .bind(account_id)
        .bind(listing_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }

    /// Favorited listings, most recently favorited first
    pub async fn list(&self, account_id: i64) -> AppResult<Vec<Listing>> {
        let columns = qualified_columns("l");
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM favorite f
            JOIN listing l ON l.id = f.listing_id
            WHERE f.account_id = ?
            ORDER BY f.created_at DESC, f.id DESC
            "#,
            columns
        ))
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_listing).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        plans::Plan,
        test_support::{at, draft, listing_fixture, seed_account, seed_category},
    };

    #[tokio::test]
    async fn test_add_list_remove() {
        let fx = listing_fixture().await;
        let favorites = FavoriteManager::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Basic, at(2024, 3, 1)).await;
        let fan = seed_account(&fx.pool, "237690000002", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let a = fx.listings.publish(owner, draft(cat, "First"), at(2024, 3, 1)).await.unwrap();
        let b = fx.listings.publish(owner, draft(cat, "Second"), at(2024, 3, 1)).await.unwrap();

        favorites.add(fan, a.id, at(2024, 3, 2)).await.unwrap();
        favorites.add(fan, b.id, at(2024, 3, 3)).await.unwrap();
        favorites.add(fan, a.id, at(2024, 3, 4)).await.unwrap();

        let listed: Vec<i64> = favorites.list(fan).await.unwrap().iter().map(|l| l.id).collect();
        assert_eq!(listed, vec![b.id, a.id]);
        assert!(favorites.is_favorite(fan, a.id).await.unwrap());

        assert!(favorites.remove(fan, a.id).await.unwrap());
        assert!(!favorites.remove(fan, a.id).await.unwrap());
        assert!(!favorites.is_favorite(fan, a.id).await.unwrap());

        let missing = favorites.add(fan, 9999, at(2024, 3, 5)).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
