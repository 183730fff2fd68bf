/// API routes and handlers
pub mod auth;
pub mod catalog;
pub mod images;
pub mod listings;
pub mod middleware;
pub mod moderation;
pub mod search;
pub mod user;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(user::routes())
        .merge(listings::routes())
        .merge(search::routes())
        .merge(catalog::routes())
        .merge(images::routes())
        .merge(moderation::routes())
}
