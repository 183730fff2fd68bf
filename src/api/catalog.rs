/// Categories, cities and quarters
///
/// Reads are public. Writes require an administrator.
use crate::{
    auth::AdminAuthContext,
    catalog::{
        Category, CategoryRequest, CategoryUpdate, CategoryWithCount, City, CityRequest, PopularCity,
        PopularQuarter, Quarter, QuarterRequest,
    },
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/all", get(list_all_categories))
        .route("/api/categories/search", get(search_categories))
        .route("/api/categories/with-counts", get(categories_with_counts))
        .route("/api/categories/:id", get(get_category).put(update_category))
        .route("/api/categories/:id/toggle", post(toggle_category))
        .route("/api/cities", get(list_cities).post(create_city))
        .route("/api/cities/regions", get(regions))
        .route("/api/cities/search", get(search_cities))
        .route("/api/cities/with-listings", get(cities_with_listings))
        .route("/api/cities/popular", get(popular_cities))
        .route("/api/cities/quarters/search", get(search_quarters))
        .route("/api/cities/quarters/popular", get(popular_quarters))
        .route("/api/cities/region/:region", get(cities_by_region))
        .route("/api/cities/:id", get(get_city))
        .route("/api/cities/:id/quarters", get(quarters).post(create_quarter))
}

#[derive(Debug, Deserialize)]
struct KeywordParams {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Deserialize)]
struct TopParams {
    #[serde(default = "default_top")]
    limit: i64,
}

fn default_top() -> i64 {
    10
}

// ========== Categories ==========

async fn list_categories(State(ctx): State<AppContext>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(ctx.categories.list_active().await?))
}

async fn list_all_categories(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(ctx.categories.list_all().await?))
}

async fn search_categories(
    State(ctx): State<AppContext>,
    Query(params): Query<KeywordParams>,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(ctx.categories.search(&params.keyword).await?))
}

async fn categories_with_counts(
    State(ctx): State<AppContext>,
) -> AppResult<Json<Vec<CategoryWithCount>>> {
    Ok(Json(ctx.categories.with_listing_counts().await?))
}

async fn get_category(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> AppResult<Json<Category>> {
    Ok(Json(ctx.categories.get(id).await?))
}

async fn create_category(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Json(req): Json<CategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = ctx.categories.create(req, Utc::now()).await?;
    info!("Admin {} created category {}", admin.account_id, category.id);
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(id): Path<i64>,
    Json(update): Json<CategoryUpdate>,
) -> AppResult<Json<Category>> {
    Ok(Json(ctx.categories.update(id, update).await?))
}

async fn toggle_category(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Category>> {
    Ok(Json(ctx.categories.toggle_active(id).await?))
}

// ========== Cities ==========

async fn list_cities(State(ctx): State<AppContext>) -> AppResult<Json<Vec<City>>> {
    Ok(Json(ctx.cities.list_active().await?))
}

async fn regions(State(ctx): State<AppContext>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(ctx.cities.regions().await?))
}

async fn search_cities(
    State(ctx): State<AppContext>,
    Query(params): Query<KeywordParams>,
) -> AppResult<Json<Vec<City>>> {
    Ok(Json(ctx.cities.search(&params.keyword).await?))
}

async fn cities_with_listings(State(ctx): State<AppContext>) -> AppResult<Json<Vec<City>>> {
    Ok(Json(ctx.cities.with_active_listings().await?))
}

async fn popular_cities(
    State(ctx): State<AppContext>,
    Query(params): Query<TopParams>,
) -> AppResult<Json<Vec<PopularCity>>> {
    Ok(Json(ctx.cities.most_popular(params.limit.clamp(1, 50)).await?))
}

async fn search_quarters(
    State(ctx): State<AppContext>,
    Query(params): Query<KeywordParams>,
) -> AppResult<Json<Vec<Quarter>>> {
    Ok(Json(ctx.cities.search_quarters(&params.keyword).await?))
}

async fn popular_quarters(
    State(ctx): State<AppContext>,
    Query(params): Query<TopParams>,
) -> AppResult<Json<Vec<PopularQuarter>>> {
    Ok(Json(ctx.cities.most_popular_quarters(params.limit.clamp(1, 50)).await?))
}

async fn cities_by_region(
    State(ctx): State<AppContext>,
    Path(region): Path<String>,
) -> AppResult<Json<Vec<City>>> {
    Ok(Json(ctx.cities.by_region(&region).await?))
}

async fn get_city(State(ctx): State<AppContext>, Path(id): Path<i64>) -> AppResult<Json<City>> {
    Ok(Json(ctx.cities.get(id).await?))
}

async fn create_city(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Json(req): Json<CityRequest>,
) -> AppResult<(StatusCode, Json<City>)> {
    Ok((StatusCode::CREATED, Json(ctx.cities.create(req).await?)))
}

async fn quarters(
    State(ctx): State<AppContext>,
    Path(city_id): Path<i64>,
) -> AppResult<Json<Vec<Quarter>>> {
    Ok(Json(ctx.cities.quarters(city_id).await?))
}

async fn create_quarter(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(city_id): Path<i64>,
    Json(req): Json<QuarterRequest>,
) -> AppResult<(StatusCode, Json<Quarter>)> {
    let quarter = ctx.cities.create_quarter(city_id, req).await?;
    Ok((StatusCode::CREATED, Json(quarter)))
}
