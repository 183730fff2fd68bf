/// Listing lifecycle: publish, counters, owner actions and the expiry sweep
use crate::{
    account::store_usage,
    error::{is_busy, AppError, AppResult},
    images::ImageBackend,
    listings::{Condition, CountBy, Listing, ListingDraft, ListingStatus, ListingUpdate},
    metrics,
    pagination::{Page, PageRequest},
    plans::{EntitlementPolicy, Plan, UsageSnapshot},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

pub(crate) const LISTING_COLUMNS: &str = "id, owner_id, category_id, title, description, price, \
     negotiable, condition, city, quarter, address, contact_phone, contact_email, \
     delivery_on_site, delivery_home, delivery_station, payment_cash, payment_mobile_money, \
     payment_transfer, is_premium, is_urgent, views, contacts, status, created_at, expires_at, \
     last_boosted_at";

/// Attempts before a contended publish gives up
const PUBLISH_ATTEMPTS: u64 = 8;

/// Listing lifecycle manager
pub struct ListingManager {
    db: SqlitePool,
    policy: Arc<EntitlementPolicy>,
    images: Arc<dyn ImageBackend>,
}

impl ListingManager {
    pub fn new(db: SqlitePool, policy: Arc<EntitlementPolicy>, images: Arc<dyn ImageBackend>) -> Self {
        Self { db, policy, images }
    }

    /// Publish a listing and charge one unit of the owner's monthly quota.
    ///
    /// The quota charge is a compare-and-swap on the account row executed in
    /// the same transaction as the insert; a lost race re-reads the account
    /// and re-evaluates the policy.
    pub async fn publish(
        &self,
        owner_id: i64,
        draft: ListingDraft,
        now: DateTime<Utc>,
    ) -> AppResult<Listing> {
        draft.validate()?;
        self.ensure_category(draft.category_id).await?;

        for attempt in 1..=PUBLISH_ATTEMPTS {
            let (stored, is_active) = self.load_usage(owner_id).await?;
            if !is_active {
                return Err(AppError::Forbidden(format!(
                    "Account {} is suspended and cannot publish",
                    owner_id
                )));
            }

            let effective = self.policy.effective_usage(&stored, now);
            if !self.policy.allows(&effective) {
                if effective.differs_from_stored() {
                    let mut conn = self.db.acquire().await?;
                    store_usage(&mut conn, owner_id, &stored, &effective).await?;
                }

                metrics::record_quota_denied(effective.plan.as_str());
                warn!(
                    "Publish denied for account {}: {} of {:?} used on plan {}",
                    owner_id,
                    effective.published_this_month,
                    self.policy.publish_limit(effective.plan),
                    effective.plan.as_str()
                );
                return Err(AppError::QuotaExceeded(format!(
                    "Monthly listing limit reached for plan {}",
                    effective.plan.display_name()
                )));
            }

            let charged = self.policy.charge(&effective);
            let mut tx = self.db.begin().await?;

            let outcome = async {
                if !store_usage(&mut tx, owner_id, &stored, &charged).await? {
                    return Ok(None);
                }
                let id = insert_listing(&mut tx, owner_id, charged.plan, &draft, &self.policy, now).await?;
                Ok::<_, AppError>(Some(id))
            }
            .await;

            match outcome {
                Ok(Some(id)) => {
                    tx.commit().await?;
                    metrics::record_listing_published(charged.plan.as_str());
                    info!(
                        "Account {} published listing {} ({} this month on {})",
                        owner_id,
                        id,
                        charged.published_this_month,
                        charged.plan.as_str()
                    );
                    return self.get(id).await;
                }
                Ok(None) => {
                    tx.rollback().await?;
                    debug!("Usage of account {} changed concurrently, retrying publish", owner_id);
                }
                Err(AppError::Database(e)) if is_busy(&e) => {
                    tx.rollback().await.ok();
                    debug!("Database busy publishing for account {}, attempt {}", owner_id, attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(10 * attempt)).await;
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }

        Err(AppError::Conflict(
            "Too many concurrent publishes, try again".to_string(),
        ))
    }

    async fn load_usage(&self, account_id: i64) -> AppResult<(UsageSnapshot, bool)> {
        let row = sqlx::query(
            "SELECT plan, plan_expires_at, published_this_month, usage_month, is_active FROM account WHERE id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

        let stored_plan: String = row.get("plan");
        let snapshot = UsageSnapshot {
            plan: Plan::from_code(&stored_plan),
            stored_plan,
            plan_expires_at: row.get("plan_expires_at"),
            published_this_month: row.get("published_this_month"),
            usage_month: row.get("usage_month"),
        };

        Ok((snapshot, row.get("is_active")))
    }

    async fn ensure_category(&self, category_id: i64) -> AppResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM category WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&self.db)
            .await?;

        exists
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", category_id)))
    }

    /// Get listing by id
    pub async fn get(&self, id: i64) -> AppResult<Listing> {
        let row = sqlx::query(&format!("SELECT {} FROM listing WHERE id = ?", LISTING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", id)))?;

        parse_listing(&row)
    }

    /// Count one view. Every call counts.
    pub async fn record_view(&self, id: i64) -> AppResult<()> {
        self.increment(id, "views").await
    }

    /// Count one WhatsApp contact. Every call counts.
    pub async fn record_whatsapp_contact(&self, id: i64) -> AppResult<()> {
        self.increment(id, "contacts").await
    }

    async fn increment(&self, id: i64, column: &'static str) -> AppResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE listing SET {column} = {column} + 1 WHERE id = ?"
        ))
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Listing {} not found", id)));
        }
        Ok(())
    }

    /// Owner marks a listing as sold
    pub async fn mark_sold(&self, id: i64, caller_id: Option<i64>) -> AppResult<Listing> {
        let listing = self.get(id).await?;
        ensure_owner(&listing, caller_id)?;

        if listing.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Listing {} is {} and cannot be marked sold",
                id,
                listing.status.as_str()
            )));
        }

        let result = sqlx::query(
            "UPDATE listing SET status = 'sold' WHERE id = ? AND status IN ('active', 'suspended')",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidTransition(format!(
                "Listing {} changed status concurrently",
                id
            )));
        }

        info!("Listing {} marked sold", id);
        self.get(id).await
    }

    /// Re-surface a listing. Expiry is unchanged.
    pub async fn boost(&self, id: i64, caller_id: Option<i64>, now: DateTime<Utc>) -> AppResult<Listing> {
        let listing = self.get(id).await?;
        ensure_owner(&listing, caller_id)?;

        sqlx::query("UPDATE listing SET last_boosted_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.db)
            .await?;

        debug!("Listing {} boosted", id);
        Ok(Listing {
            last_boosted_at: Some(now),
            ..listing
        })
    }

    /// Owner edit; never touches status, counters or expiry
    pub async fn update(
        &self,
        id: i64,
        caller_id: Option<i64>,
        update: ListingUpdate,
    ) -> AppResult<Listing> {
        update.validate()?;
        let listing = self.get(id).await?;
        ensure_owner(&listing, caller_id)?;

        sqlx::query(
            r#"
            UPDATE listing
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                price = COALESCE(?, price),
                negotiable = COALESCE(?, negotiable),
                condition = COALESCE(?, condition),
                address = COALESCE(?, address)
            WHERE id = ?
            "#,
        )
        .bind(update.title.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(update.price)
        .bind(update.negotiable)
        .bind(update.condition.map(|c| c.as_str()))
        .bind(&update.address)
        .bind(id)
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    /// Delete a listing with its images, favorites, signals and moderation history
    pub async fn delete(&self, id: i64, caller_id: Option<i64>) -> AppResult<()> {
        let listing = self.get(id).await?;
        ensure_owner(&listing, caller_id)?;

        let mut tx = self.db.begin().await?;

        let files: Vec<String> =
            sqlx::query_scalar("DELETE FROM listing_image WHERE listing_id = ? RETURNING file_name")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM favorite WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM listing_moderation_log WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM signal WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM listing WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Listing {} not found", id)));
        }

        tx.commit().await?;

        for file in &files {
            if let Err(e) = self.images.delete(file).await {
                warn!("Failed to remove image file {} of listing {}: {}", file, id, e);
            }
        }

        info!("Listing {} deleted with {} images", id, files.len());
        Ok(())
    }

    /// Expire every Active listing whose expiry has passed. Idempotent.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE listing SET status = 'expired' WHERE status = 'active' AND expires_at < ?",
        )
        .bind(now)
        .execute(&self.db)
        .await?;

        let count = result.rows_affected();
        metrics::record_listings_expired(count);
        if count > 0 {
            info!("Expired {} listings", count);
        }

        Ok(count)
    }

    /// Other Active listings in the same category and city, newest first
    pub async fn similar_listings(&self, id: i64, limit: i64) -> AppResult<Vec<Listing>> {
        let source = self.get(id).await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM listing
            WHERE status = 'active' AND category_id = ? AND city = ? AND id != ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
            LISTING_COLUMNS
        ))
        .bind(source.category_id)
        .bind(&source.city)
        .bind(id)
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_listing).collect()
    }

    /// Listings of one owner, all statuses unless `active_only`
    pub async fn list_by_owner(
        &self,
        owner_id: i64,
        active_only: bool,
        page: PageRequest,
    ) -> AppResult<Page<Listing>> {
        let filter = if active_only {
            "owner_id = ? AND status = 'active'"
        } else {
            "owner_id = ?"
        };
        self.page_where(filter, Some(owner_id), page).await
    }

    /// Active listings, newest first
    pub async fn list_active(&self, page: PageRequest) -> AppResult<Page<Listing>> {
        self.page_where("status = 'active'", None, page).await
    }

    pub async fn list_by_category(&self, category_id: i64, page: PageRequest) -> AppResult<Page<Listing>> {
        self.page_where("category_id = ? AND status = 'active'", Some(category_id), page)
            .await
    }

    /// `filter` holds at most one `?` placeholder, bound to `param`
    async fn page_where(
        &self,
        filter: &str,
        param: Option<i64>,
        page: PageRequest,
    ) -> AppResult<Page<Listing>> {
        let page = page.normalized();

        let count_sql = format!("SELECT COUNT(*) FROM listing WHERE {}", filter);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(param) = param {
            count_query = count_query.bind(param);
        }
        let total = count_query.fetch_one(&self.db).await?;

        let select_sql = format!(
            "SELECT {} FROM listing WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            LISTING_COLUMNS, filter
        );
        let mut query = sqlx::query(&select_sql);
        if let Some(param) = param {
            query = query.bind(param);
        }
        let rows = query
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        let items = rows.iter().map(parse_listing).collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    /// Active listing counts per category name
    pub async fn stats_by_category(&self) -> AppResult<Vec<CountBy>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name AS key, COUNT(l.id) AS count
            FROM listing l JOIN category c ON c.id = l.category_id
            WHERE l.status = 'active'
            GROUP BY c.id
            ORDER BY count DESC, key
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_count).collect())
    }

    /// Active listing counts per city
    pub async fn stats_by_city(&self) -> AppResult<Vec<CountBy>> {
        let rows = sqlx::query(
            r#"
            SELECT city AS key, COUNT(*) AS count
            FROM listing
            WHERE status = 'active'
            GROUP BY city
            ORDER BY count DESC, key
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(parse_count).collect())
    }
}

async fn insert_listing(
    conn: &mut SqliteConnection,
    owner_id: i64,
    plan: Plan,
    draft: &ListingDraft,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> AppResult<i64> {
    let expires_at = now + Duration::days(policy.listing_lifetime_days(plan));

    let result = sqlx::query(
        r#"
        INSERT INTO listing (owner_id, category_id, title, description, price, negotiable, condition,
                             city, quarter, address, contact_phone, contact_email,
                             delivery_on_site, delivery_home, delivery_station,
                             payment_cash, payment_mobile_money, payment_transfer,
                             is_premium, is_urgent, views, contacts, status, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 'active', ?, ?)
        "#,
    )
    .bind(owner_id)
    .bind(draft.category_id)
    .bind(draft.title.trim())
    .bind(&draft.description)
    .bind(draft.price)
    .bind(draft.negotiable.unwrap_or(true))
    .bind(draft.condition.unwrap_or_default().as_str())
    .bind(draft.city.trim())
    .bind(&draft.quarter)
    .bind(&draft.address)
    .bind(&draft.contact_phone)
    .bind(&draft.contact_email)
    .bind(draft.delivery_on_site.unwrap_or(true))
    .bind(draft.delivery_home.unwrap_or(false))
    .bind(draft.delivery_station.unwrap_or(false))
    .bind(draft.payment_cash.unwrap_or(true))
    .bind(draft.payment_mobile_money.unwrap_or(false))
    .bind(draft.payment_transfer.unwrap_or(false))
    .bind(matches!(plan, Plan::Pro | Plan::Shop))
    .bind(draft.is_urgent.unwrap_or(false))
    .bind(now)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Listing columns prefixed with a table alias, for joins
pub(crate) fn qualified_columns(alias: &str) -> String {
    LISTING_COLUMNS
        .split(',')
        .map(|column| format!("{}.{}", alias, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ensure_owner(listing: &Listing, caller_id: Option<i64>) -> AppResult<()> {
    match caller_id {
        Some(caller) if caller == listing.owner_id => Ok(()),
        _ => Err(AppError::Forbidden(format!(
            "Listing {} does not belong to the caller",
            listing.id
        ))),
    }
}

/// Active → Suspended. Returns false when the listing was not Active.
pub(crate) async fn suspend_in_tx(conn: &mut SqliteConnection, listing_id: i64) -> AppResult<bool> {
    let result = sqlx::query("UPDATE listing SET status = 'suspended' WHERE id = ? AND status = 'active'")
        .bind(listing_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Suspended → Active. Returns false when the listing was not Suspended.
pub(crate) async fn reactivate_in_tx(conn: &mut SqliteConnection, listing_id: i64) -> AppResult<bool> {
    let result = sqlx::query("UPDATE listing SET status = 'active' WHERE id = ? AND status = 'suspended'")
        .bind(listing_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) fn parse_listing(row: &SqliteRow) -> AppResult<Listing> {
    let status: String = row.get("status");
    let condition: String = row.get("condition");

    Ok(Listing {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        category_id: row.get("category_id"),
        title: row.get("title"),
        description: row.get("description"),
        price: row.get("price"),
        negotiable: row.get("negotiable"),
        condition: Condition::from_str(&condition).unwrap_or_default(),
        city: row.get("city"),
        quarter: row.get("quarter"),
        address: row.get("address"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        delivery_on_site: row.get("delivery_on_site"),
        delivery_home: row.get("delivery_home"),
        delivery_station: row.get("delivery_station"),
        payment_cash: row.get("payment_cash"),
        payment_mobile_money: row.get("payment_mobile_money"),
        payment_transfer: row.get("payment_transfer"),
        is_premium: row.get("is_premium"),
        is_urgent: row.get("is_urgent"),
        views: row.get("views"),
        contacts: row.get("contacts"),
        status: ListingStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        last_boosted_at: row.get("last_boosted_at"),
    })
}

fn parse_count(row: &SqliteRow) -> CountBy {
    CountBy {
        key: row.get("key"),
        count: row.get("count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        at, draft, listing_fixture, seed_account, seed_category, set_status,
    };

    #[tokio::test]
    async fn test_publish_sets_expiry_from_plan() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Basic, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;

        let now = at(2024, 3, 5);
        let listing = fx.listings.publish(owner, draft(cat, "Tecno Spark"), now).await.unwrap();

        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.expires_at, now + Duration::days(30));
        assert_eq!(listing.views, 0);
        assert_eq!(listing.contacts, 0);
        assert!(listing.negotiable);
        assert_eq!(listing.condition, Condition::Good);
    }

    #[tokio::test]
    async fn test_publish_charges_quota_once() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;

        fx.listings.publish(owner, draft(cat, "First"), at(2024, 3, 2)).await.unwrap();

        let used: i64 = sqlx::query_scalar("SELECT published_this_month FROM account WHERE id = ?")
            .bind(owner)
            .fetch_one(&fx.pool)
            .await
            .unwrap();
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn test_publish_unknown_category() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;

        let result = fx.listings.publish(owner, draft(999, "Orphan"), at(2024, 3, 2)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let used: i64 = sqlx::query_scalar("SELECT published_this_month FROM account WHERE id = ?")
            .bind(owner)
            .fetch_one(&fx.pool)
            .await
            .unwrap();
        assert_eq!(used, 0);
    }

    #[tokio::test]
    async fn test_quota_denied_persists_downgrade() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        sqlx::query("UPDATE account SET plan_expires_at = ?, published_this_month = 4 WHERE id = ?")
            .bind(at(2024, 3, 10))
            .bind(owner)
            .execute(&fx.pool)
            .await
            .unwrap();

        let result = fx.listings.publish(owner, draft(cat, "Late"), at(2024, 3, 11)).await;
        assert!(matches!(result, Err(AppError::QuotaExceeded(_))));

        let plan: String = sqlx::query_scalar("SELECT plan FROM account WHERE id = ?")
            .bind(owner)
            .fetch_one(&fx.pool)
            .await
            .unwrap();
        assert_eq!(plan, "free");
    }

    #[tokio::test]
    async fn test_expired_plan_uses_free_lifetime() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Shop, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        sqlx::query("UPDATE account SET plan_expires_at = ? WHERE id = ?")
            .bind(at(2024, 3, 2))
            .bind(owner)
            .execute(&fx.pool)
            .await
            .unwrap();

        let now = at(2024, 3, 3);
        let listing = fx.listings.publish(owner, draft(cat, "Downgraded"), now).await.unwrap();
        assert_eq!(listing.expires_at, now + Duration::days(14));
        assert!(!listing.is_premium);
    }

    #[tokio::test]
    async fn test_suspended_account_cannot_publish() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        sqlx::query("UPDATE account SET is_active = 0 WHERE id = ?")
            .bind(owner)
            .execute(&fx.pool)
            .await
            .unwrap();

        let result = fx.listings.publish(owner, draft(cat, "Blocked"), at(2024, 3, 2)).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_counters_are_not_idempotent() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let listing = fx.listings.publish(owner, draft(cat, "Viewed"), at(2024, 3, 2)).await.unwrap();

        for _ in 0..3 {
            fx.listings.record_view(listing.id).await.unwrap();
        }
        fx.listings.record_whatsapp_contact(listing.id).await.unwrap();

        let reloaded = fx.listings.get(listing.id).await.unwrap();
        assert_eq!(reloaded.views, 3);
        assert_eq!(reloaded.contacts, 1);

        assert!(matches!(
            fx.listings.record_view(9999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_sold_transitions() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Basic, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let a = fx.listings.publish(owner, draft(cat, "Active one"), at(2024, 3, 2)).await.unwrap();
        let b = fx.listings.publish(owner, draft(cat, "Suspended one"), at(2024, 3, 2)).await.unwrap();
        let c = fx.listings.publish(owner, draft(cat, "Expired one"), at(2024, 3, 2)).await.unwrap();
        set_status(&fx.pool, b.id, ListingStatus::Suspended).await;
        set_status(&fx.pool, c.id, ListingStatus::Expired).await;

        assert_eq!(fx.listings.mark_sold(a.id, Some(owner)).await.unwrap().status, ListingStatus::Sold);
        assert_eq!(fx.listings.mark_sold(b.id, Some(owner)).await.unwrap().status, ListingStatus::Sold);
        assert!(matches!(
            fx.listings.mark_sold(c.id, Some(owner)).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            fx.listings.mark_sold(a.id, Some(owner)).await,
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_update_leaves_status_and_expiry() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let listing = fx.listings.publish(owner, draft(cat, "Old title"), at(2024, 3, 2)).await.unwrap();
        fx.listings.record_view(listing.id).await.unwrap();

        let updated = fx
            .listings
            .update(
                listing.id,
                Some(owner),
                ListingUpdate {
                    title: Some("New title".to_string()),
                    price: Some(15000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "New title");
        assert_eq!(updated.price, Some(15000));
        assert_eq!(updated.description, listing.description);
        assert_eq!(updated.status, ListingStatus::Active);
        assert_eq!(updated.expires_at, listing.expires_at);
        assert_eq!(updated.views, 1);
    }

    #[tokio::test]
    async fn test_boost_keeps_expiry() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        let listing = fx.listings.publish(owner, draft(cat, "Boosted"), at(2024, 3, 2)).await.unwrap();

        let boosted = fx.listings.boost(listing.id, Some(owner), at(2024, 3, 4)).await.unwrap();
        assert_eq!(boosted.last_boosted_at, Some(at(2024, 3, 4)));
        assert_eq!(fx.listings.get(listing.id).await.unwrap().expires_at, listing.expires_at);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Free, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        fx.listings.publish(owner, draft(cat, "Short lived"), at(2024, 3, 1)).await.unwrap();
        let sold = fx.listings.publish(owner, draft(cat, "Sold early"), at(2024, 3, 1)).await.unwrap();
        fx.listings.mark_sold(sold.id, Some(owner)).await.unwrap();

        let later = at(2024, 3, 20);
        assert_eq!(fx.listings.sweep_expired(later).await.unwrap(), 1);
        assert_eq!(fx.listings.sweep_expired(later).await.unwrap(), 0);
        assert_eq!(fx.listings.get(sold.id).await.unwrap().status, ListingStatus::Sold);
    }

    #[tokio::test]
    async fn test_similar_listings() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let phones = seed_category(&fx.pool, "Phones").await;
        let cars = seed_category(&fx.pool, "Cars").await;

        let source = fx.listings.publish(owner, draft(phones, "Source"), at(2024, 3, 1)).await.unwrap();
        let older = fx.listings.publish(owner, draft(phones, "Older"), at(2024, 3, 2)).await.unwrap();
        let newer = fx.listings.publish(owner, draft(phones, "Newer"), at(2024, 3, 3)).await.unwrap();
        let sold = fx.listings.publish(owner, draft(phones, "Sold"), at(2024, 3, 4)).await.unwrap();
        fx.listings.publish(owner, draft(cars, "Other category"), at(2024, 3, 5)).await.unwrap();
        let mut elsewhere = draft(phones, "Other city");
        elsewhere.city = "Yaoundé".to_string();
        fx.listings.publish(owner, elsewhere, at(2024, 3, 6)).await.unwrap();
        fx.listings.mark_sold(sold.id, Some(owner)).await.unwrap();

        let similar = fx.listings.similar_listings(source.id, 10).await.unwrap();
        let ids: Vec<i64> = similar.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let capped = fx.listings.similar_listings(source.id, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_owner_listing_pages_and_stats() {
        let fx = listing_fixture().await;
        let owner = seed_account(&fx.pool, "237690000001", Plan::Pro, at(2024, 3, 1)).await;
        let cat = seed_category(&fx.pool, "Phones").await;
        for i in 0..3 {
            fx.listings
                .publish(owner, draft(cat, &format!("Item {}", i)), at(2024, 3, 1 + i))
                .await
                .unwrap();
        }

        let page = fx.listings.list_by_owner(owner, false, PageRequest::new(0, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Item 2");

        let by_category = fx.listings.stats_by_category().await.unwrap();
        assert_eq!(by_category[0].key, "Phones");
        assert_eq!(by_category[0].count, 3);

        let by_city = fx.listings.stats_by_city().await.unwrap();
        assert_eq!(by_city[0].key, "Douala");
    }
}
