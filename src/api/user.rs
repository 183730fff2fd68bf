/// Profile, subscription and favorites of the logged-in account
use crate::{
    account::{Account, ChangePlanRequest, ConvertToShopRequest, EntitlementStatus, ProfileUpdate},
    auth::AuthContext,
    context::AppContext,
    error::AppResult,
    listings::Listing,
    pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE},
    plans::Plan,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/user/profile", get(get_profile).put(update_profile))
        .route("/api/user/my-listings", get(my_listings))
        .route("/api/user/convert-to-shop", post(convert_to_shop))
        .route("/api/user/change-plan", post(change_plan))
        .route("/api/user/can-publish", get(can_publish))
        .route("/api/user/favorites", get(list_favorites))
        .route("/api/shops", get(list_shops))
        .route(
            "/api/user/favorites/:listing_id",
            get(check_favorite).post(add_favorite).delete(remove_favorite),
        )
}

async fn get_profile(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<Account>> {
    Ok(Json(ctx.account_manager.get_account(auth.account_id).await?))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Account>> {
    let account = ctx
        .account_manager
        .update_profile(auth.account_id, update)
        .await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyListingsParams {
    #[serde(default)]
    active_only: bool,
    #[serde(default)]
    page: i64,
    size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ShopParams {
    #[serde(default)]
    page: i64,
    size: Option<i64>,
}

/// Public directory of shop accounts
async fn list_shops(
    State(ctx): State<AppContext>,
    Query(params): Query<ShopParams>,
) -> AppResult<Json<Page<Account>>> {
    let page = PageRequest::new(params.page, params.size.unwrap_or(DEFAULT_PAGE_SIZE));
    Ok(Json(ctx.account_manager.list_shops(page).await?))
}

async fn my_listings(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<MyListingsParams>,
) -> AppResult<Json<Page<Listing>>> {
    let page = PageRequest::new(params.page, params.size.unwrap_or(DEFAULT_PAGE_SIZE));
    let listings = ctx
        .listing_manager
        .list_by_owner(auth.account_id, params.active_only, page)
        .await?;
    Ok(Json(listings))
}

async fn convert_to_shop(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ConvertToShopRequest>,
) -> AppResult<Json<Account>> {
    let account = ctx
        .account_manager
        .convert_to_shop(auth.account_id, req)
        .await?;
    Ok(Json(account))
}

async fn change_plan(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePlanRequest>,
) -> AppResult<Json<Account>> {
    let plan = Plan::from_code(&req.plan);
    let account = ctx
        .account_manager
        .change_plan(auth.account_id, plan, Utc::now())
        .await?;
    Ok(Json(account))
}

async fn can_publish(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<EntitlementStatus>> {
    let status = ctx
        .account_manager
        .entitlement_status(auth.account_id, Utc::now())
        .await?;
    Ok(Json(status))
}

async fn list_favorites(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<Vec<Listing>>> {
    Ok(Json(ctx.favorites.list(auth.account_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteStatus {
    listing_id: i64,
    favorite: bool,
}

async fn check_favorite(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<Json<FavoriteStatus>> {
    let favorite = ctx.favorites.is_favorite(auth.account_id, listing_id).await?;
    Ok(Json(FavoriteStatus { listing_id, favorite }))
}

async fn add_favorite(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<(StatusCode, Json<FavoriteStatus>)> {
    ctx.favorites
        .add(auth.account_id, listing_id, Utc::now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(FavoriteStatus {
            listing_id,
            favorite: true,
        }),
    ))
}

async fn remove_favorite(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(listing_id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.favorites.remove(auth.account_id, listing_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
