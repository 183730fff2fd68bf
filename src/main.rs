/// Annonces marketplace server
use annonces::{jobs::JobScheduler, server, AppContext, AppResult, ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "annonces=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Annonces v{} starting", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::from_env()?;
    let jobs_enabled = config.jobs.enabled;

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    if jobs_enabled {
        let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
        scheduler.start();
    } else {
        info!("Background jobs disabled");
    }

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
