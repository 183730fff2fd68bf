use crate::{
    catalog::{Category, CategoryRequest, CategoryUpdate, CategoryWithCount},
    error::{is_unique_violation, AppError, AppResult},
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;
use validator::Validate;

const CATEGORY_COLUMNS: &str =
    "id, name, name_en, emoji, description, display_order, is_active, created_at";

/// Category manager
pub struct CategoryManager {
    db: SqlitePool,
}

impl CategoryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Active categories in display order
    pub async fn list_active(&self) -> AppResult<Vec<Category>> {
        self.fetch_where("is_active = 1").await
    }

    pub async fn list_all(&self) -> AppResult<Vec<Category>> {
        self.fetch_where("1 = 1").await
    }

    async fn fetch_where(&self, filter: &str) -> AppResult<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM category WHERE {} ORDER BY display_order, name",
            CATEGORY_COLUMNS, filter
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_category).collect())
    }

    pub async fn get(&self, id: i64) -> AppResult<Category> {
        let row = sqlx::query(&format!("SELECT {} FROM category WHERE id = ?", CATEGORY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;

        Ok(parse_category(&row))
    }

    /// Active categories whose French or English name contains `keyword`
    pub async fn search(&self, keyword: &str) -> AppResult<Vec<Category>> {
        let pattern = format!("%{}%", keyword.trim().to_lowercase());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM category
            WHERE is_active = 1 AND (LOWER(name) LIKE ? OR LOWER(COALESCE(name_en, '')) LIKE ?)
            ORDER BY display_order, name
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_category).collect())
    }

    /// Active categories with their Active listing counts, busiest first
    pub async fn with_listing_counts(&self) -> AppResult<Vec<CategoryWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.name_en, c.emoji, c.description, c.display_order, c.is_active,
                   c.created_at, COUNT(l.id) AS listing_count
            FROM category c
            LEFT JOIN listing l ON l.category_id = c.id AND l.status = 'active'
            WHERE c.is_active = 1
            GROUP BY c.id
            ORDER BY listing_count DESC, c.display_order, c.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CategoryWithCount {
                category: parse_category(row),
                listing_count: row.get("listing_count"),
            })
            .collect())
    }

    pub async fn create(&self, req: CategoryRequest, now: DateTime<Utc>) -> AppResult<Category> {
        req.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO category (name, name_en, emoji, description, display_order, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(req.name.trim())
        .bind(&req.name_en)
        .bind(&req.emoji)
        .bind(&req.description)
        .bind(req.display_order.unwrap_or(0))
        .bind(now)
        .execute(&self.db)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(format!(
                    "Category {} already exists",
                    req.name.trim()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created category {} ({})", id, req.name.trim());
        self.get(id).await
    }

    pub async fn update(&self, id: i64, update: CategoryUpdate) -> AppResult<Category> {
        update.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE category
            SET name = COALESCE(?, name),
                name_en = COALESCE(?, name_en),
                emoji = COALESCE(?, emoji),
                description = COALESCE(?, description),
                display_order = COALESCE(?, display_order)
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.name_en)
        .bind(&update.emoji)
        .bind(&update.description)
        .bind(update.display_order)
        .bind(id)
        .execute(&self.db)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(AppError::NotFound(format!("Category {} not found", id)))
            }
            Ok(_) => self.get(id).await,
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(
                "Another category already has this name".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Flip the active flag
    pub async fn toggle_active(&self, id: i64) -> AppResult<Category> {
        let result = sqlx::query("UPDATE category SET is_active = NOT is_active WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category {} not found", id)));
        }

        self.get(id).await
    }
}

fn parse_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        name_en: row.get("name_en"),
        emoji: row.get("emoji"),
        description: row.get("description"),
        display_order: row.get("display_order"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        plans::Plan,
        test_support::{at, draft, listing_fixture, seed_account},
    };

    fn request(name: &str, order: i64) -> CategoryRequest {
        CategoryRequest {
            name: name.to_string(),
            display_order: Some(order),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_order() {
        let fx = listing_fixture().await;
        let categories = CategoryManager::new(fx.pool.clone());

        categories.create(request("Véhicules", 2), at(2024, 3, 1)).await.unwrap();
        let phones = categories
            .create(
                CategoryRequest {
                    name_en: Some("Phones".into()),
                    emoji: Some("📱".into()),
                    ..request("Téléphones", 1)
                },
                at(2024, 3, 1),
            )
            .await
            .unwrap();

        let names: Vec<String> = categories.list_active().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Téléphones", "Véhicules"]);

        let duplicate = categories.create(request("Véhicules", 3), at(2024, 3, 1)).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let found = categories.search("phone").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, phones.id);
    }

    #[tokio::test]
    async fn test_update_and_toggle() {
        let fx = listing_fixture().await;
        let categories = CategoryManager::new(fx.pool.clone());
        let cat = categories.create(request("Immobilier", 1), at(2024, 3, 1)).await.unwrap();

        let updated = categories
            .update(
                cat.id,
                CategoryUpdate {
                    description: Some("Maisons et terrains".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Immobilier");
        assert_eq!(updated.description.as_deref(), Some("Maisons et terrains"));

        let hidden = categories.toggle_active(cat.id).await.unwrap();
        assert!(!hidden.is_active);
        assert!(categories.list_active().await.unwrap().is_empty());
        assert_eq!(categories.list_all().await.unwrap().len(), 1);

        assert!(matches!(categories.toggle_active(9999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listing_counts() {
        let fx = listing_fixture().await;
        let categories = CategoryManager::new(fx.pool.clone());
        let busy = categories.create(request("Mode", 1), at(2024, 3, 1)).await.unwrap();
        categories.create(request("Emploi", 2), at(2024, 3, 1)).await.unwrap();

        let owner = seed_account(&fx.pool, "237690000001", Plan::Basic, at(2024, 3, 1)).await;
        fx.listings.publish(owner, draft(busy.id, "Robe en pagne"), at(2024, 3, 1)).await.unwrap();

        let counts = categories.with_listing_counts().await.unwrap();
        assert_eq!(counts[0].category.id, busy.id);
        assert_eq!(counts[0].listing_count, 1);
        assert_eq!(counts[1].listing_count, 0);
    }
}
