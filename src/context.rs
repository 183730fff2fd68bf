/// Application context and dependency injection
use crate::{
    account::AccountManager,
    catalog::{CategoryManager, CityManager},
    config::ServerConfig,
    db,
    error::{AppError, AppResult},
    favorites::FavoriteManager,
    images::{DiskImageBackend, ImageBackend, ImageManager},
    listings::{ListingManager, SearchService},
    moderation::ModerationWorkflow,
    plans::EntitlementPolicy,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub policy: Arc<EntitlementPolicy>,
    pub account_manager: Arc<AccountManager>,
    pub listing_manager: Arc<ListingManager>,
    pub search: Arc<SearchService>,
    pub moderation: Arc<ModerationWorkflow>,
    pub favorites: Arc<FavoriteManager>,
    pub images: Arc<ImageManager>,
    // Reference data
    pub categories: Arc<CategoryManager>,
    pub cities: Arc<CityManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let db = db::create_pool(&config.storage.database, options).await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        info!("Database ready at {:?}", config.storage.database);

        Ok(Self::from_pool(config, db))
    }

    /// Wire every service over an already migrated pool
    pub fn from_pool(config: ServerConfig, db: SqlitePool) -> Self {
        let config = Arc::new(config);
        let policy = Arc::new(EntitlementPolicy::default());

        let image_backend: Arc<dyn ImageBackend> =
            Arc::new(DiskImageBackend::new(config.storage.image_directory.clone()));

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone(), policy.clone()));
        let listing_manager = Arc::new(ListingManager::new(
            db.clone(),
            policy.clone(),
            image_backend.clone(),
        ));
        let images = Arc::new(ImageManager::new(
            db.clone(),
            image_backend,
            policy.clone(),
            config.storage.image_upload_limit,
        ));
        let moderation = Arc::new(ModerationWorkflow::new(
            db.clone(),
            config.moderation.auto_suspend_threshold,
        ));

        Self {
            search: Arc::new(SearchService::new(db.clone())),
            favorites: Arc::new(FavoriteManager::new(db.clone())),
            categories: Arc::new(CategoryManager::new(db.clone())),
            cities: Arc::new(CityManager::new(db.clone())),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config,
            db,
            policy,
            account_manager,
            listing_manager,
            moderation,
            images,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dirs = [
            &config.storage.data_directory,
            &config.storage.image_directory,
        ];

        for dir in dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
