/// Report intake, threshold suspension and admin review
use crate::{
    error::{is_unique_violation, AppError, AppResult},
    listings::{reactivate_in_tx, suspend_in_tx, ListingStatus},
    metrics,
    moderation::{
        ModerationAction, ModerationLogEntry, ModerationSource, ReasonCount, ReportOutcome,
        ReportedAccount, ReportedListing, Signal, SignalReason, SignalStatus, StatusCount,
    },
    pagination::{Page, PageRequest},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

const SIGNAL_COLUMNS: &str = "id, listing_id, reporter_id, reason, description, reporter_ip, \
     status, resolved_by, resolution_comment, reported_at, resolved_at";

/// Moderation workflow
pub struct ModerationWorkflow {
    db: SqlitePool,
    /// Reports on one listing that trigger automatic suspension
    threshold: i64,
}

impl ModerationWorkflow {
    pub fn new(db: SqlitePool, threshold: i64) -> Self {
        Self { db, threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// File a report. Reaching the threshold suspends an Active listing.
    ///
    /// Insert, recount and suspension share one transaction, so the report
    /// that reaches the threshold is the one that suspends.
    pub async fn report(
        &self,
        listing_id: i64,
        reporter_id: Option<i64>,
        reason: SignalReason,
        description: Option<String>,
        reporter_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<ReportOutcome> {
        self.ensure_listing(listing_id).await?;

        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO signal (listing_id, reporter_id, reason, description, reporter_ip, status, reported_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(listing_id)
        .bind(reporter_id)
        .bind(reason.as_str())
        .bind(&description)
        .bind(&reporter_ip)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let signal_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(AppError::DuplicateReport(format!(
                    "Listing {} was already reported by this account",
                    listing_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let total_reports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signal WHERE listing_id = ?")
            .bind(listing_id)
            .fetch_one(&mut *tx)
            .await?;

        let mut listing_suspended = false;
        if total_reports >= self.threshold {
            listing_suspended = suspend_in_tx(&mut tx, listing_id).await?;
            if listing_suspended {
                log_in_tx(
                    &mut tx,
                    listing_id,
                    ModerationAction::Suspend,
                    ModerationSource::Auto,
                    None,
                    Some(format!("{} reports", total_reports)),
                    Some(signal_id),
                    now,
                )
                .await?;
            }
        }

        tx.commit().await?;

        metrics::record_report_filed(reason.as_str());
        if listing_suspended {
            metrics::record_moderation_action(ModerationAction::Suspend.as_str(), ModerationSource::Auto.as_str());
            warn!(
                "Listing {} suspended automatically after {} reports",
                listing_id, total_reports
            );
        } else {
            debug!("Listing {} reported ({} total)", listing_id, total_reports);
        }

        Ok(ReportOutcome {
            signal: Signal {
                id: signal_id,
                listing_id,
                reporter_id,
                reason,
                description,
                reporter_ip,
                status: SignalStatus::Pending,
                resolved_by: None,
                resolution_comment: None,
                reported_at: now,
                resolved_at: None,
            },
            total_reports,
            listing_suspended,
        })
    }

    /// Uphold a report and suspend its listing if still Active
    pub async fn approve(
        &self,
        signal_id: i64,
        admin_id: i64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Signal> {
        let mut tx = self.db.begin().await?;
        let listing_id =
            resolve_in_tx(&mut tx, signal_id, SignalStatus::Resolved, admin_id, &comment, now).await?;

        let suspended = suspend_in_tx(&mut tx, listing_id).await?;
        if suspended {
            log_in_tx(
                &mut tx,
                listing_id,
                ModerationAction::Suspend,
                ModerationSource::Admin,
                Some(admin_id),
                comment.clone(),
                Some(signal_id),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        if suspended {
            metrics::record_moderation_action(ModerationAction::Suspend.as_str(), ModerationSource::Admin.as_str());
        }
        info!("Report {} approved by admin {}", signal_id, admin_id);

        self.get_signal(signal_id).await
    }

    /// Dismiss a report; the listing is left as is
    pub async fn reject(
        &self,
        signal_id: i64,
        admin_id: i64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Signal> {
        let mut tx = self.db.begin().await?;
        resolve_in_tx(&mut tx, signal_id, SignalStatus::Rejected, admin_id, &comment, now).await?;
        tx.commit().await?;

        info!("Report {} rejected by admin {}", signal_id, admin_id);
        self.get_signal(signal_id).await
    }

    /// Admin suspension of an Active listing
    pub async fn suspend(
        &self,
        listing_id: i64,
        admin_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.admin_transition(listing_id, admin_id, reason, ModerationAction::Suspend, now)
            .await
    }

    /// Admin reactivation of a Suspended listing.
    ///
    /// A listing whose expiry passed while suspended is expired by the next sweep.
    pub async fn reactivate(
        &self,
        listing_id: i64,
        admin_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.admin_transition(listing_id, admin_id, reason, ModerationAction::Reactivate, now)
            .await
    }

    async fn admin_transition(
        &self,
        listing_id: i64,
        admin_id: i64,
        reason: Option<String>,
        action: ModerationAction,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let changed = match action {
            ModerationAction::Suspend => suspend_in_tx(&mut tx, listing_id).await?,
            ModerationAction::Reactivate => reactivate_in_tx(&mut tx, listing_id).await?,
        };

        if !changed {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM listing WHERE id = ?")
                .bind(listing_id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return Err(match status {
                None => AppError::NotFound(format!("Listing {} not found", listing_id)),
                Some(status) => AppError::InvalidTransition(format!(
                    "Cannot {} listing {} while it is {}",
                    action.as_str(),
                    listing_id,
                    status
                )),
            });
        }

        log_in_tx(
            &mut tx,
            listing_id,
            action,
            ModerationSource::Admin,
            Some(admin_id),
            reason,
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        metrics::record_moderation_action(action.as_str(), ModerationSource::Admin.as_str());
        info!("Listing {}: {} by admin {}", listing_id, action.as_str(), admin_id);
        Ok(())
    }

    pub async fn get_signal(&self, signal_id: i64) -> AppResult<Signal> {
        let row = sqlx::query(&format!("SELECT {} FROM signal WHERE id = ?", SIGNAL_COLUMNS))
            .bind(signal_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", signal_id)))?;

        parse_signal(&row)
    }

    pub async fn has_reported(&self, account_id: i64, listing_id: i64) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signal WHERE reporter_id = ? AND listing_id = ?",
        )
        .bind(account_id)
        .bind(listing_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    /// Pending reports, oldest first
    pub async fn pending_reports(&self, page: PageRequest) -> AppResult<Page<Signal>> {
        let page = page.normalized();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signal WHERE status = 'pending'")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM signal WHERE status = 'pending' ORDER BY reported_at, id LIMIT ? OFFSET ?",
            SIGNAL_COLUMNS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let items = rows.iter().map(parse_signal).collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(items, page, total))
    }

    pub async fn reports_for_listing(&self, listing_id: i64) -> AppResult<Vec<Signal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM signal WHERE listing_id = ? ORDER BY reported_at DESC, id DESC",
            SIGNAL_COLUMNS
        ))
        .bind(listing_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_signal).collect()
    }

    pub async fn reports_by_reason(&self, reason: SignalReason) -> AppResult<Vec<Signal>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM signal WHERE reason = ? ORDER BY reported_at DESC, id DESC",
            SIGNAL_COLUMNS
        ))
        .bind(reason.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_signal).collect()
    }

    /// Reports filed in `[from, to)`, newest first
    pub async fn reports_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> AppResult<Vec<Signal>> {
        if from > to {
            return Err(AppError::Validation("`from` must not be after `to`".to_string()));
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM signal WHERE reported_at >= ? AND reported_at < ? ORDER BY reported_at DESC, id DESC",
            SIGNAL_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_signal).collect()
    }

    /// Suspensions and reactivations of a listing, oldest first
    pub async fn moderation_history(&self, listing_id: i64) -> AppResult<Vec<ModerationLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, listing_id, action, source, actor_id, reason, signal_id, created_at
            FROM listing_moderation_log
            WHERE listing_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(listing_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ModerationLogEntry {
                id: row.get("id"),
                listing_id: row.get("listing_id"),
                action: ModerationAction::from_str(&row.get::<String, _>("action")),
                source: ModerationSource::from_str(&row.get::<String, _>("source")),
                actor_id: row.get("actor_id"),
                reason: row.get("reason"),
                signal_id: row.get("signal_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Listings with the most reports of any status
    pub async fn most_reported_listings(&self, limit: i64) -> AppResult<Vec<ReportedListing>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id AS listing_id, l.title, l.status, COUNT(s.id) AS report_count
            FROM signal s JOIN listing l ON l.id = s.listing_id
            GROUP BY l.id
            ORDER BY report_count DESC, l.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_reported_listing).collect()
    }

    /// Listings with at least `min_reports` pending reports
    pub async fn listings_over_threshold(&self, min_reports: i64) -> AppResult<Vec<ReportedListing>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id AS listing_id, l.title, l.status, COUNT(s.id) AS report_count
            FROM signal s JOIN listing l ON l.id = s.listing_id
            WHERE s.status = 'pending'
            GROUP BY l.id
            HAVING COUNT(s.id) >= ?
            ORDER BY report_count DESC, l.id
            "#,
        )
        .bind(min_reports)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_reported_listing).collect()
    }

    /// Listing owners ranked by reports received
    pub async fn most_reported_accounts(&self, limit: i64) -> AppResult<Vec<ReportedAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id AS account_id, a.name, a.phone, COUNT(s.id) AS report_count
            FROM signal s
            JOIN listing l ON l.id = s.listing_id
            JOIN account a ON a.id = l.owner_id
            GROUP BY a.id
            ORDER BY report_count DESC, a.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ReportedAccount {
                account_id: row.get("account_id"),
                name: row.get("name"),
                phone: row.get("phone"),
                report_count: row.get("report_count"),
            })
            .collect())
    }

    pub async fn counts_by_reason(&self) -> AppResult<Vec<ReasonCount>> {
        let rows = sqlx::query(
            "SELECT reason, COUNT(*) AS count FROM signal GROUP BY reason ORDER BY count DESC, reason",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ReasonCount {
                    reason: SignalReason::from_str(&row.get::<String, _>("reason"))?,
                    count: row.get("count"),
                })
            })
            .collect()
    }

    pub async fn counts_by_status(&self) -> AppResult<Vec<StatusCount>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM signal GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StatusCount {
                    status: SignalStatus::from_str(&row.get::<String, _>("status"))?,
                    count: row.get("count"),
                })
            })
            .collect()
    }

    /// Pending reports older than `older_than_days` become Expired
    pub async fn expire_stale_reports(&self, older_than_days: i64, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - Duration::days(older_than_days);

        let result = sqlx::query(
            r#"
            UPDATE signal SET status = 'expired', resolution_comment = ?, resolved_at = ?
            WHERE status = 'pending' AND reported_at < ?
            "#,
        )
        .bind(format!("Report expired automatically after {} days", older_than_days))
        .bind(now)
        .bind(cutoff)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            info!("Expired {} stale reports", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    async fn ensure_listing(&self, listing_id: i64) -> AppResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM listing WHERE id = ?")
            .bind(listing_id)
            .fetch_optional(&self.db)
            .await?;

        exists
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))
    }
}

/// Move a Pending signal to `status`; returns its listing id
async fn resolve_in_tx(
    conn: &mut SqliteConnection,
    signal_id: i64,
    status: SignalStatus,
    admin_id: i64,
    comment: &Option<String>,
    now: DateTime<Utc>,
) -> AppResult<i64> {
    let listing_id: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE signal
        SET status = ?, resolved_by = ?, resolution_comment = ?, resolved_at = ?
        WHERE id = ? AND status = 'pending'
        RETURNING listing_id
        "#,
    )
    .bind(status.as_str())
    .bind(admin_id)
    .bind(comment)
    .bind(now)
    .bind(signal_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(listing_id) = listing_id {
        return Ok(listing_id);
    }

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM signal WHERE id = ?")
        .bind(signal_id)
        .fetch_optional(&mut *conn)
        .await?;

    Err(match current {
        None => AppError::NotFound(format!("Report {} not found", signal_id)),
        Some(current) => AppError::InvalidTransition(format!(
            "Report {} is already {}",
            signal_id, current
        )),
    })
}

#[allow(clippy::too_many_arguments)]
async fn log_in_tx(
    conn: &mut SqliteConnection,
    listing_id: i64,
    action: ModerationAction,
    source: ModerationSource,
    actor_id: Option<i64>,
    reason: Option<String>,
    signal_id: Option<i64>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO listing_moderation_log (listing_id, action, source, actor_id, reason, signal_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(listing_id)
    .bind(action.as_str())
    .bind(source.as_str())
    .bind(actor_id)
    .bind(reason)
    .bind(signal_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn parse_signal(row: &SqliteRow) -> AppResult<Signal> {
    Ok(Signal {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        reporter_id: row.get("reporter_id"),
        reason: SignalReason::from_str(&row.get::<String, _>("reason"))?,
        description: row.get("description"),
        reporter_ip: row.get("reporter_ip"),
        status: SignalStatus::from_str(&row.get::<String, _>("status"))?,
        resolved_by: row.get("resolved_by"),
        resolution_comment: row.get("resolution_comment"),
        reported_at: row.get("reported_at"),
        resolved_at: row.get("resolved_at"),
    })
}

fn parse_reported_listing(row: &SqliteRow) -> AppResult<ReportedListing> {
    Ok(ReportedListing {
        listing_id: row.get("listing_id"),
        title: row.get("title"),
        status: ListingStatus::from_str(&row.get::<String, _>("status"))?,
        report_count: row.get("report_count"),
    })
}
