/// Filtered, sorted and paginated search over Active listings
use crate::{
    error::{AppError, AppResult},
    listings::{
        manager::{parse_listing, LISTING_COLUMNS},
        Condition, Listing,
    },
    pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Date,
    Price,
    Views,
    /// WhatsApp contact count
    Contacts,
    Title,
    /// Most recently boosted first, then newest
    Boost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Search filters; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    /// Matched against title and description, case-insensitive
    pub keyword: Option<String>,
    pub category_id: Option<i64>,
    pub city: Option<String>,
    pub quarter: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub condition: Option<Condition>,
    pub negotiable: Option<bool>,
    pub home_delivery: Option<bool>,
    pub mobile_money: Option<bool>,
    pub premium_only: bool,
    pub urgent_only: bool,
    pub shops_only: bool,
    /// Only listings created in the last N days
    pub recent_days: Option<i64>,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl SearchQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    fn validate(&self) -> AppResult<()> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(AppError::Validation(
                    "minPrice must not exceed maxPrice".to_string(),
                ));
            }
        }
        if matches!(self.recent_days, Some(days) if days < 0) {
            return Err(AppError::Validation("recentDays must be positive".to_string()));
        }
        Ok(())
    }

    fn order_clause(&self) -> String {
        let dir = self.direction.sql();
        match self.sort {
            SortField::Date => format!("created_at {dir}, id {dir}"),
            SortField::Price => format!("price {dir}, id {dir}"),
            SortField::Views => format!("views {dir}, id {dir}"),
            SortField::Contacts => format!("contacts {dir}, id {dir}"),
            SortField::Title => format!("title COLLATE NOCASE {dir}, id {dir}"),
            SortField::Boost => {
                format!("last_boosted_at {dir} NULLS LAST, created_at {dir}, id {dir}")
            }
        }
    }
}

/// Escape LIKE wildcards in user input
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &SearchQuery, now: DateTime<Utc>) {
    if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
        let pattern = like_pattern(keyword);
        builder
            .push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(description) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(category_id) = query.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(city) = query.city.as_deref().filter(|c| !c.is_empty()) {
        builder.push(" AND city = ").push_bind(city.to_string());
    }
    if let Some(quarter) = query.quarter.as_deref().filter(|q| !q.is_empty()) {
        builder.push(" AND quarter = ").push_bind(quarter.to_string());
    }
    if let Some(min) = query.min_price {
        builder.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        builder.push(" AND price <= ").push_bind(max);
    }
    if let Some(condition) = query.condition {
        builder.push(" AND condition = ").push_bind(condition.as_str());
    }
    if let Some(negotiable) = query.negotiable {
        builder.push(" AND negotiable = ").push_bind(negotiable);
    }
    if query.home_delivery == Some(true) {
        builder.push(" AND delivery_home = 1");
    }
    if query.mobile_money == Some(true) {
        builder.push(" AND payment_mobile_money = 1");
    }
    if query.premium_only {
        builder.push(" AND is_premium = 1");
    }
    if query.urgent_only {
        builder.push(" AND is_urgent = 1");
    }
    if query.shops_only {
        builder.push(" AND owner_id IN (SELECT id FROM account WHERE is_shop = 1)");
    }
    if let Some(days) = query.recent_days {
        builder
            .push(" AND created_at >= ")
            .push_bind(now - Duration::days(days));
    }
}

/// Search service
pub struct SearchService {
    db: SqlitePool,
}

impl SearchService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn search(&self, query: &SearchQuery, now: DateTime<Utc>) -> AppResult<Page<Listing>> {
        query.validate()?;
        let page = query.page_request();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM listing WHERE status = 'active'");
        push_filters(&mut count, query, now);
        let total: i64 = count.build_query_scalar().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM listing WHERE status = 'active'",
            LISTING_COLUMNS
        ));
        push_filters(&mut select, query, now);
        select
            .push(" ORDER BY ")
            .push(query.order_clause())
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select.build().fetch_all(&self.db).await?;
        let items = rows.iter().map(parse_listing).collect::<AppResult<Vec<_>>>()?;

        Ok(Page::new(items, page, total))
    }

    /// Titles of Active listings containing `keyword`, most viewed first
    pub async fn suggestions(&self, keyword: &str, limit: i64) -> AppResult<Vec<String>> {
        if keyword.trim().chars().count() < 2 {
            return Ok(Vec::new());
        }

        let titles = sqlx::query_scalar(
            r#"
            SELECT title FROM listing
            WHERE status = 'active' AND LOWER(title) LIKE ? ESCAPE '\'
            GROUP BY title
            ORDER BY MAX(views) DESC, title
            LIMIT ?
            "#,
        )
        .bind(like_pattern(keyword))
        .bind(limit.clamp(1, 50))
        .fetch_all(&self.db)
        .await?;

        Ok(titles)
    }

    pub async fn most_viewed(&self, limit: i64) -> AppResult<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listing WHERE status = 'active' ORDER BY views DESC, id DESC LIMIT ?",
            LISTING_COLUMNS
        ))
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_listing).collect()
    }

    /// Active listings with the most WhatsApp contacts
    pub async fn most_contacted(&self, limit: i64) -> AppResult<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listing WHERE status = 'active' ORDER BY contacts DESC, id DESC LIMIT ?",
            LISTING_COLUMNS
        ))
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_listing).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        listings::ListingStatus,
        plans::Plan,
        test_support::{at, draft, listing_fixture, seed_account, seed_category, set_status},
    };

    #[tokio::test]
    async fn test_filters_and_total() {
        let fx = listing_fixture().await;
        let search = SearchService::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Shop, at(2024, 3, 1)).await;
        let phones = seed_category(&fx.pool, "Phones").await;
        let cars = seed_category(&fx.pool, "Cars").await;

        let mut cheap = draft(phones, "Samsung A10");
        cheap.price = Some(30000);
        let mut pricey = draft(phones, "iPhone 13");
        pricey.price = Some(350000);
        pricey.delivery_home = Some(true);
        let mut car = draft(cars, "Toyota Corolla");
        car.price = Some(4_500_000);
        car.city = "Yaoundé".to_string();

        fx.listings.publish(owner, cheap, at(2024, 3, 1)).await.unwrap();
        let iphone = fx.listings.publish(owner, pricey, at(2024, 3, 2)).await.unwrap();
        fx.listings.publish(owner, car, at(2024, 3, 3)).await.unwrap();
        let hidden = fx.listings.publish(owner, draft(phones, "iPhone 12"), at(2024, 3, 3)).await.unwrap();
        set_status(&fx.pool, hidden.id, ListingStatus::Suspended).await;

        let now = at(2024, 3, 5);
        let by_keyword = search
            .search(&SearchQuery { keyword: Some("IPHONE".into()), ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(by_keyword.total, 1);
        assert_eq!(by_keyword.items[0].id, iphone.id);

        let by_price = search
            .search(
                &SearchQuery {
                    category_id: Some(phones),
                    max_price: Some(100000),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(by_price.total, 1);
        assert_eq!(by_price.items[0].title, "Samsung A10");

        let delivered = search
            .search(&SearchQuery { home_delivery: Some(true), ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(delivered.total, 1);

        let in_yaounde = search
            .search(&SearchQuery { city: Some("Yaoundé".into()), ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(in_yaounde.items[0].title, "Toyota Corolla");

        let premium = search
            .search(&SearchQuery { premium_only: true, ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(premium.total, 3);
    }

    #[tokio::test]
    async fn test_sorting_and_paging() {
        let fx = listing_fixture().await;
        let search = SearchService::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;

        let mut ids = Vec::new();
        for (day, price) in [(1, 500), (2, 100), (3, 300)] {
            let mut d = draft(cat, &format!("Phone {}", day));
            d.price = Some(price);
            ids.push(fx.listings.publish(owner, d, at(2024, 3, day)).await.unwrap().id);
        }
        fx.listings.boost(ids[0], Some(owner), at(2024, 3, 4)).await.unwrap();

        let now = at(2024, 3, 5);
        let newest = search.search(&SearchQuery::default(), now).await.unwrap();
        assert_eq!(newest.items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![ids[2], ids[1], ids[0]]);

        let cheapest = search
            .search(
                &SearchQuery {
                    sort: SortField::Price,
                    direction: SortDirection::Asc,
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(cheapest.items[0].price, Some(100));

        let boosted = search
            .search(&SearchQuery { sort: SortField::Boost, ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(boosted.items[0].id, ids[0]);

        let second_page = search
            .search(&SearchQuery { page: Some(1), size: Some(2), ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(second_page.total, 3);
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_recent_days_and_invalid_range() {
        let fx = listing_fixture().await;
        let search = SearchService::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        fx.listings.publish(owner, draft(cat, "Old phone"), at(2024, 3, 1)).await.unwrap();
        fx.listings.publish(owner, draft(cat, "New phone"), at(2024, 3, 9)).await.unwrap();

        let recent = search
            .search(&SearchQuery { recent_days: Some(3), ..Default::default() }, at(2024, 3, 10))
            .await
            .unwrap();
        assert_eq!(recent.total, 1);
        assert_eq!(recent.items[0].title, "New phone");

        let invalid = search
            .search(
                &SearchQuery {
                    min_price: Some(10),
                    max_price: Some(5),
                    ..Default::default()
                },
                at(2024, 3, 10),
            )
            .await;
        assert!(matches!(invalid, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_suggestions_and_most_viewed() {
        let fx = listing_fixture().await;
        let search = SearchService::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let a = fx.listings.publish(owner, draft(cat, "Tecno Camon"), at(2024, 3, 1)).await.unwrap();
        fx.listings.publish(owner, draft(cat, "Tecno Spark"), at(2024, 3, 1)).await.unwrap();
        fx.listings.record_view(a.id).await.unwrap();

        let suggestions = search.suggestions("tec", 10).await.unwrap();
        assert_eq!(suggestions, vec!["Tecno Camon".to_string(), "Tecno Spark".to_string()]);
        assert!(search.suggestions("t", 10).await.unwrap().is_empty());

        let viewed = search.most_viewed(1).await.unwrap();
        assert_eq!(viewed[0].id, a.id);
    }

    #[tokio::test]
    async fn test_most_contacted() {
        let fx = listing_fixture().await;
        let search = SearchService::new(fx.pool.clone());
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let quiet = fx.listings.publish(owner, draft(cat, "Itel A70"), at(2024, 3, 1)).await.unwrap();
        let busy = fx.listings.publish(owner, draft(cat, "Itel S23"), at(2024, 3, 1)).await.unwrap();
        fx.listings.record_whatsapp_contact(busy.id).await.unwrap();
        fx.listings.record_whatsapp_contact(busy.id).await.unwrap();
        fx.listings.record_whatsapp_contact(quiet.id).await.unwrap();

        let contacted = search.most_contacted(10).await.unwrap();
        assert_eq!(contacted[0].id, busy.id);
        assert_eq!(contacted[0].contacts, 2);

        let sorted = search
            .search(
                &SearchQuery {
                    sort: SortField::Contacts,
                    direction: SortDirection::Asc,
                    ..Default::default()
                },
                at(2024, 3, 2),
            )
            .await
            .unwrap();
        assert_eq!(sorted.items[0].id, quiet.id);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
