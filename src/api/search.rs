/// Public search endpoints and the plan catalog
use crate::{
    context::AppContext,
    error::AppResult,
    listings::{Listing, SearchQuery},
    pagination::Page,
    plans::PlanSummary,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/search/suggestions", get(suggestions))
        .route("/api/search/most-viewed", get(most_viewed))
        .route("/api/search/most-contacted", get(most_contacted))
        .route("/api/plans", get(plans))
}

async fn search(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Page<Listing>>> {
    Ok(Json(ctx.search.search(&query, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
struct SuggestionParams {
    #[serde(default)]
    keyword: String,
    limit: Option<i64>,
}

async fn suggestions(
    State(ctx): State<AppContext>,
    Query(params): Query<SuggestionParams>,
) -> AppResult<Json<Vec<String>>> {
    let titles = ctx
        .search
        .suggestions(&params.keyword, params.limit.unwrap_or(10))
        .await?;
    Ok(Json(titles))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

async fn most_viewed(
    State(ctx): State<AppContext>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<Vec<Listing>>> {
    Ok(Json(ctx.search.most_viewed(params.limit.unwrap_or(10)).await?))
}

async fn most_contacted(
    State(ctx): State<AppContext>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<Vec<Listing>>> {
    Ok(Json(ctx.search.most_contacted(params.limit.unwrap_or(10)).await?))
}

async fn plans(State(ctx): State<AppContext>) -> Json<Vec<PlanSummary>> {
    Json(ctx.policy.catalog())
}
