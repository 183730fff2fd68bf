/// Report filing and the administrator moderation console
use crate::{
    account::{Account, PlanCount},
    auth::{AdminAuthContext, AuthContext, OptionalAuthContext},
    api::middleware::client_ip,
    context::AppContext,
    error::AppResult,
    listings::{CountBy, Listing},
    moderation::{
        ListingActionRequest, ModerationLogEntry, ReasonCount, ReportOutcome, ReportRequest,
        ReportedAccount, ReportedListing, ResolveRequest, Signal, SignalReason, StatusCount,
    },
    pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use validator::Validate;

const ANALYTICS_LIMIT: i64 = 10;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/moderation/signal", post(report))
        .route("/api/moderation/has-reported/:listing_id", get(has_reported))
        .route("/api/moderation/admin/pending", get(pending_reports))
        .route("/api/moderation/admin/signals", get(reports_between))
        .route("/api/moderation/admin/signals/:signal_id", get(get_signal))
        .route("/api/moderation/admin/signals/:signal_id/approve", post(approve))
        .route("/api/moderation/admin/signals/:signal_id/reject", post(reject))
        .route("/api/moderation/admin/reasons/:reason", get(reports_by_reason))
        .route("/api/moderation/admin/listings/:listing_id/signals", get(reports_for_listing))
        .route("/api/moderation/admin/listings/:listing_id/history", get(moderation_history))
        .route("/api/moderation/admin/listings/:listing_id/suspend", post(suspend_listing))
        .route("/api/moderation/admin/listings/:listing_id/reactivate", post(reactivate_listing))
        .route("/api/moderation/admin/analytics", get(analytics))
        .route("/api/moderation/admin/sweep", post(run_sweep))
        .route("/api/moderation/admin/accounts", get(search_accounts))
        .route("/api/moderation/admin/accounts/:account_id/suspend", post(suspend_account))
        .route("/api/moderation/admin/accounts/:account_id/activate", post(activate_account))
}

/// File a report; anonymous callers are allowed
async fn report(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    headers: HeaderMap,
    Json(req): Json<ReportRequest>,
) -> AppResult<(StatusCode, Json<ReportOutcome>)> {
    req.validate()?;

    let outcome = ctx
        .moderation
        .report(
            req.listing_id,
            auth.account_id(),
            req.reason,
            req.description,
            client_ip(&headers),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn has_reported(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let reported = ctx
        .moderation
        .has_reported(auth.account_id, listing_id)
        .await?;
    Ok(Json(json!({ "listingId": listing_id, "reported": reported })))
}

// ========== Admin: reports ==========

async fn pending_reports(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<Signal>>> {
    Ok(Json(ctx.moderation.pending_reports(page.normalized()).await?))
}

async fn get_signal(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(signal_id): Path<i64>,
) -> AppResult<Json<Signal>> {
    Ok(Json(ctx.moderation.get_signal(signal_id).await?))
}

async fn approve(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(signal_id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> AppResult<Json<Signal>> {
    req.validate()?;
    let signal = ctx
        .moderation
        .approve(signal_id, admin.account_id, req.comment, Utc::now())
        .await?;
    Ok(Json(signal))
}

async fn reject(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(signal_id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> AppResult<Json<Signal>> {
    req.validate()?;
    let signal = ctx
        .moderation
        .reject(signal_id, admin.account_id, req.comment, Utc::now())
        .await?;
    Ok(Json(signal))
}

#[derive(Debug, Deserialize)]
struct DateRangeParams {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

async fn reports_between(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Query(range): Query<DateRangeParams>,
) -> AppResult<Json<Vec<Signal>>> {
    Ok(Json(ctx.moderation.reports_between(range.from, range.to).await?))
}

async fn reports_by_reason(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(reason): Path<String>,
) -> AppResult<Json<Vec<Signal>>> {
    let reason = SignalReason::from_str(&reason)?;
    Ok(Json(ctx.moderation.reports_by_reason(reason).await?))
}

async fn reports_for_listing(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<Vec<Signal>>> {
    Ok(Json(ctx.moderation.reports_for_listing(listing_id).await?))
}

async fn moderation_history(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<Vec<ModerationLogEntry>>> {
    Ok(Json(ctx.moderation.moderation_history(listing_id).await?))
}

// ========== Admin: listings ==========

async fn suspend_listing(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(listing_id): Path<i64>,
    Json(req): Json<ListingActionRequest>,
) -> AppResult<Json<Listing>> {
    req.validate()?;
    ctx.moderation
        .suspend(listing_id, admin.account_id, req.reason, Utc::now())
        .await?;
    Ok(Json(ctx.listing_manager.get(listing_id).await?))
}

async fn reactivate_listing(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(listing_id): Path<i64>,
    Json(req): Json<ListingActionRequest>,
) -> AppResult<Json<Listing>> {
    req.validate()?;
    ctx.moderation
        .reactivate(listing_id, admin.account_id, req.reason, Utc::now())
        .await?;
    Ok(Json(ctx.listing_manager.get(listing_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Analytics {
    threshold: i64,
    most_reported_listings: Vec<ReportedListing>,
    listings_over_threshold: Vec<ReportedListing>,
    most_reported_accounts: Vec<ReportedAccount>,
    reports_by_reason: Vec<ReasonCount>,
    reports_by_status: Vec<StatusCount>,
    listings_by_category: Vec<CountBy>,
    listings_by_city: Vec<CountBy>,
    accounts_by_plan: Vec<PlanCount>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsParams {
    limit: Option<i64>,
}

async fn analytics(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Query(params): Query<AnalyticsParams>,
) -> AppResult<Json<Analytics>> {
    let limit = params.limit.unwrap_or(ANALYTICS_LIMIT).clamp(1, 100);
    let threshold = ctx.moderation.threshold();

    Ok(Json(Analytics {
        threshold,
        most_reported_listings: ctx.moderation.most_reported_listings(limit).await?,
        listings_over_threshold: ctx.moderation.listings_over_threshold(threshold).await?,
        most_reported_accounts: ctx.moderation.most_reported_accounts(limit).await?,
        reports_by_reason: ctx.moderation.counts_by_reason().await?,
        reports_by_status: ctx.moderation.counts_by_status().await?,
        listings_by_category: ctx.listing_manager.stats_by_category().await?,
        listings_by_city: ctx.listing_manager.stats_by_city().await?,
        accounts_by_plan: ctx.account_manager.stats_by_plan().await?,
    }))
}

/// Run the expiry sweep now instead of waiting for the scheduler
async fn run_sweep(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
) -> AppResult<Json<Value>> {
    let expired = ctx.listing_manager.sweep_expired(Utc::now()).await?;
    info!("Admin {} triggered a sweep: {} listings expired", admin.account_id, expired);
    Ok(Json(json!({ "expired": expired })))
}

// ========== Admin: accounts ==========

#[derive(Debug, Deserialize)]
struct AccountSearchParams {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    page: i64,
    size: Option<i64>,
}

async fn search_accounts(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Query(params): Query<AccountSearchParams>,
) -> AppResult<Json<Page<Account>>> {
    let page = PageRequest::new(params.page, params.size.unwrap_or(DEFAULT_PAGE_SIZE));
    Ok(Json(ctx.account_manager.search_accounts(&params.keyword, page).await?))
}

async fn suspend_account(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(account_id): Path<i64>,
) -> AppResult<Json<Account>> {
    let account = ctx.account_manager.set_active(account_id, false).await?;
    info!("Admin {} suspended account {}", admin.account_id, account_id);
    Ok(Json(account))
}

async fn activate_account(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(account_id): Path<i64>,
) -> AppResult<Json<Account>> {
    let account = ctx.account_manager.set_active(account_id, true).await?;
    info!("Admin {} activated account {}", admin.account_id, account_id);
    Ok(Json(account))
}
