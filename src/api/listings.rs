/// Listing endpoints: publishing, owner actions and public reads
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::AppResult,
    images::ListingImage,
    listings::{Listing, ListingDraft, ListingUpdate},
    pagination::{Page, PageRequest},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_SIMILAR_LIMIT: i64 = 6;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/listings", post(publish).get(list_active))
        .route(
            "/api/listings/:id",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/api/listings/:id/mark-sold", post(mark_sold))
        .route("/api/listings/:id/boost", post(boost))
        .route("/api/listings/:id/whatsapp-contact", post(whatsapp_contact))
        .route("/api/listings/:id/similar", get(similar))
        .route("/api/listings/category/:category_id", get(by_category))
}

async fn publish(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(draft): Json<ListingDraft>,
) -> AppResult<(StatusCode, Json<Listing>)> {
    let listing = ctx
        .listing_manager
        .publish(auth.account_id, draft, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn list_active(
    State(ctx): State<AppContext>,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<Listing>>> {
    Ok(Json(ctx.listing_manager.list_active(page.normalized()).await?))
}

/// Listing with its photos and, for a logged-in caller, favorite state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingDetail {
    #[serde(flatten)]
    listing: Listing,
    images: Vec<ListingImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_favorite: Option<bool>,
}

async fn get_listing(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ListingDetail>> {
    ctx.listing_manager.record_view(id).await?;
    let listing = ctx.listing_manager.get(id).await?;
    let images = ctx.images.list(id).await?;

    let is_favorite = match auth.account_id() {
        Some(account_id) => Some(ctx.favorites.is_favorite(account_id, id).await?),
        None => None,
    };

    Ok(Json(ListingDetail {
        listing,
        images,
        is_favorite,
    }))
}

async fn update_listing(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    Json(update): Json<ListingUpdate>,
) -> AppResult<Json<Listing>> {
    let listing = ctx
        .listing_manager
        .update(id, Some(auth.account_id), update)
        .await?;
    Ok(Json(listing))
}

async fn delete_listing(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ctx.listing_manager.delete(id, Some(auth.account_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_sold(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    Ok(Json(ctx.listing_manager.mark_sold(id, Some(auth.account_id)).await?))
}

async fn boost(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Listing>> {
    let listing = ctx
        .listing_manager
        .boost(id, Some(auth.account_id), Utc::now())
        .await?;
    Ok(Json(listing))
}

/// Count a WhatsApp contact and hand back the number to open
async fn whatsapp_contact(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    ctx.listing_manager.record_whatsapp_contact(id).await?;
    let listing = ctx.listing_manager.get(id).await?;

    let phone = match listing.contact_phone {
        Some(phone) => phone,
        None => ctx.account_manager.get_account(listing.owner_id).await?.phone,
    };

    Ok(Json(json!({
        "listingId": id,
        "phone": phone,
        "contacts": listing.contacts,
    })))
}

#[derive(Debug, Deserialize)]
struct SimilarParams {
    limit: Option<i64>,
}

async fn similar(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Query(params): Query<SimilarParams>,
) -> AppResult<Json<Vec<Listing>>> {
    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT).clamp(1, 50);
    Ok(Json(ctx.listing_manager.similar_listings(id, limit).await?))
}

async fn by_category(
    State(ctx): State<AppContext>,
    Path(category_id): Path<i64>,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<Listing>>> {
    let listings = ctx
        .listing_manager
        .list_by_category(category_id, page.normalized())
        .await?;
    Ok(Json(listings))
}
