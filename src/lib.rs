/// Annonces - classifieds marketplace backend
///
/// Plans and publishing quotas, the listing lifecycle (publish, sell, boost,
/// expire) and report-driven moderation, served over an axum JSON API.
pub mod account;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod favorites;
pub mod images;
pub mod jobs;
pub mod listings;
pub mod metrics;
pub mod moderation;
pub mod pagination;
pub mod plans;
pub mod rate_limit;
pub mod server;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};
