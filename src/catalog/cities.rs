use crate::{
    catalog::{City, CityRequest, PopularCity, PopularQuarter, Quarter, QuarterRequest},
    error::{is_unique_violation, AppError, AppResult},
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;
use validator::Validate;

/// City and quarter manager
pub struct CityManager {
    db: SqlitePool,
}

impl CityManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list_active(&self) -> AppResult<Vec<City>> {
        let rows = sqlx::query("SELECT id, name, region, is_active FROM city WHERE is_active = 1 ORDER BY name")
            .fetch_all(&self.db)
            .await?;

        Ok(rows.iter().map(parse_city).collect())
    }

    /// Distinct regions of active cities
    pub async fn regions(&self) -> AppResult<Vec<String>> {
        let regions = sqlx::query_scalar(
            "SELECT DISTINCT region FROM city WHERE is_active = 1 ORDER BY region",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(regions)
    }

    pub async fn by_region(&self, region: &str) -> AppResult<Vec<City>> {
        let rows = sqlx::query(
            "SELECT id, name, region, is_active FROM city WHERE is_active = 1 AND region = ? ORDER BY name",
        )
        .bind(region)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_city).collect())
    }

    pub async fn get(&self, id: i64) -> AppResult<City> {
        let row = sqlx::query("SELECT id, name, region, is_active FROM city WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("City {} not found", id)))?;

        Ok(parse_city(&row))
    }

    pub async fn search(&self, keyword: &str) -> AppResult<Vec<City>> {
        let rows = sqlx::query(
            "SELECT id, name, region, is_active FROM city WHERE is_active = 1 AND LOWER(name) LIKE ? ORDER BY name",
        )
        .bind(format!("%{}%", keyword.trim().to_lowercase()))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_city).collect())
    }

    /// Active cities that currently have at least one Active listing
    pub async fn with_active_listings(&self) -> AppResult<Vec<City>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.region, c.is_active
            FROM city c
            WHERE c.is_active = 1
              AND EXISTS (SELECT 1 FROM listing l WHERE l.city = c.name AND l.status = 'active')
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_city).collect())
    }

    /// Cities with the most Active listings, busiest first
    pub async fn most_popular(&self, limit: i64) -> AppResult<Vec<PopularCity>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.region, c.is_active, COUNT(l.id) AS active_listings
            FROM city c
            JOIN listing l ON l.city = c.name AND l.status = 'active'
            WHERE c.is_active = 1
            GROUP BY c.id
            ORDER BY active_listings DESC, c.name
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PopularCity {
                city: parse_city(row),
                active_listings: row.get("active_listings"),
            })
            .collect())
    }

    pub async fn create(&self, req: CityRequest) -> AppResult<City> {
        req.validate()?;

        let result = sqlx::query("INSERT INTO city (name, region, is_active) VALUES (?, ?, 1)")
            .bind(req.name.trim())
            .bind(req.region.trim())
            .execute(&self.db)
            .await;

        match result {
            Ok(done) => {
                info!("Created city {}", req.name.trim());
                self.get(done.last_insert_rowid()).await
            }
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(format!(
                "City {} already exists",
                req.name.trim()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn quarters(&self, city_id: i64) -> AppResult<Vec<Quarter>> {
        self.get(city_id).await?;

        let rows = sqlx::query(
            "SELECT id, name, city_id, is_active FROM quarter WHERE city_id = ? AND is_active = 1 ORDER BY name",
        )
        .bind(city_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_quarter).collect())
    }

    /// Quarters whose own name or city name matches `keyword`
    pub async fn search_quarters(&self, keyword: &str) -> AppResult<Vec<Quarter>> {
        let pattern = format!("%{}%", keyword.trim().to_lowercase());
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.name, q.city_id, q.is_active
            FROM quarter q
            JOIN city c ON c.id = q.city_id
            WHERE q.is_active = 1 AND (LOWER(q.name) LIKE ? OR LOWER(c.name) LIKE ?)
            ORDER BY c.name, q.name
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_quarter).collect())
    }

    /// Quarters with the most Active listings. A listing counts for a quarter
    /// only when both its city and quarter names match.
    pub async fn most_popular_quarters(&self, limit: i64) -> AppResult<Vec<PopularQuarter>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id, q.name, q.city_id, q.is_active, c.name AS city_name,
                   COUNT(l.id) AS active_listings
            FROM quarter q
            JOIN city c ON c.id = q.city_id
            JOIN listing l ON l.city = c.name AND l.quarter = q.name AND l.status = 'active'
            WHERE q.is_active = 1
            GROUP BY q.id
            ORDER BY active_listings DESC, q.name
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PopularQuarter {
                quarter: parse_quarter(row),
                city_name: row.get("city_name"),
                active_listings: row.get("active_listings"),
            })
            .collect())
    }

    /// Quarter names are unique within a city
    pub async fn create_quarter(&self, city_id: i64, req: QuarterRequest) -> AppResult<Quarter> {
        req.validate()?;
        self.get(city_id).await?;

        let result = sqlx::query("INSERT INTO quarter (name, city_id, is_active) VALUES (?, ?, 1)")
            .bind(req.name.trim())
            .bind(city_id)
            .execute(&self.db)
            .await;

        match result {
            Ok(done) => Ok(Quarter {
                id: done.last_insert_rowid(),
                name: req.name.trim().to_string(),
                city_id,
                is_active: true,
            }),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(format!(
                "Quarter {} already exists in this city",
                req.name.trim()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_city(row: &SqliteRow) -> City {
    City {
        id: row.get("id"),
        name: row.get("name"),
        region: row.get("region"),
        is_active: row.get("is_active"),
    }
}

fn parse_quarter(row: &SqliteRow) -> Quarter {
    Quarter {
        id: row.get("id"),
        name: row.get("name"),
        city_id: row.get("city_id"),
        is_active: row.get("is_active"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn city(name: &str, region: &str) -> CityRequest {
        CityRequest {
            name: name.to_string(),
            region: region.to_string(),
        }
    }

    #[tokio::test]
    async fn test_cities_and_regions() {
        let cities = CityManager::new(db::memory_pool().await.unwrap());
        cities.create(city("Douala", "Littoral")).await.unwrap();
        cities.create(city("Yaoundé", "Centre")).await.unwrap();
        cities.create(city("Edéa", "Littoral")).await.unwrap();

        assert_eq!(cities.regions().await.unwrap(), vec!["Centre", "Littoral"]);
        assert_eq!(cities.by_region("Littoral").await.unwrap().len(), 2);
        assert_eq!(cities.search("yaou").await.unwrap().len(), 1);

        let duplicate = cities.create(city("Douala", "Littoral")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_quarters_unique_per_city() {
        let cities = CityManager::new(db::memory_pool().await.unwrap());
        let douala = cities.create(city("Douala", "Littoral")).await.unwrap();
        let yaounde = cities.create(city("Yaoundé", "Centre")).await.unwrap();
        let akwa = || QuarterRequest { name: "Akwa".to_string() };

        cities.create_quarter(douala.id, akwa()).await.unwrap();
        // Same name in another city is fine
        cities.create_quarter(yaounde.id, akwa()).await.unwrap();

        let duplicate = cities.create_quarter(douala.id, akwa()).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        assert_eq!(cities.quarters(douala.id).await.unwrap().len(), 1);
        assert!(matches!(cities.quarters(9999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_popularity_counts_active_listings() {
        use crate::{
            listings::ListingStatus,
            plans::Plan,
            test_support::{at, draft, listing_fixture, seed_account, seed_category, set_status},
        };

        let fx = listing_fixture().await;
        let cities = CityManager::new(fx.pool.clone());
        let douala = cities.create(city("Douala", "Littoral")).await.unwrap();
        let yaounde = cities.create(city("Yaoundé", "Centre")).await.unwrap();
        cities.create(city("Bafoussam", "Ouest")).await.unwrap();
        let akwa = cities
            .create_quarter(douala.id, QuarterRequest { name: "Akwa".to_string() })
            .await
            .unwrap();
        cities
            .create_quarter(yaounde.id, QuarterRequest { name: "Bastos".to_string() })
            .await
            .unwrap();

        let now = at(2024, 3, 1);
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, now).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        fx.listings.publish(owner, draft(cat, "Tecno Spark"), now).await.unwrap();
        fx.listings.publish(owner, draft(cat, "Infinix Hot"), now).await.unwrap();
        let in_yaounde = crate::listings::ListingDraft {
            city: "Yaoundé".to_string(),
            quarter: Some("Akwa".to_string()),
            ..draft(cat, "Samsung A14")
        };
        let sold = fx.listings.publish(owner, in_yaounde, now).await.unwrap();

        let popular = cities.most_popular(10).await.unwrap();
        assert_eq!(popular.len(), 2);
        assert_eq!(popular[0].city.id, douala.id);
        assert_eq!(popular[0].active_listings, 2);

        // Akwa in Yaoundé does not exist, so that listing counts for no quarter
        let quarters = cities.most_popular_quarters(10).await.unwrap();
        assert_eq!(quarters.len(), 1);
        assert_eq!(quarters[0].quarter.id, akwa.id);
        assert_eq!(quarters[0].city_name, "Douala");
        assert_eq!(quarters[0].active_listings, 2);

        set_status(&fx.pool, sold.id, ListingStatus::Sold).await;
        let with_listings = cities.with_active_listings().await.unwrap();
        assert_eq!(with_listings.len(), 1);
        assert_eq!(with_listings[0].name, "Douala");

        assert_eq!(cities.search_quarters("bast").await.unwrap().len(), 1);
        // Matching on the city name returns all of its quarters
        assert_eq!(cities.search_quarters("douala").await.unwrap()[0].id, akwa.id);
    }
}
