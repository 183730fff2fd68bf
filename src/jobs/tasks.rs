/// Background task implementations
use crate::{context::AppContext, error::AppResult};
use chrono::Utc;

/// Move Active listings past their expiry to Expired
pub async fn sweep_expired_listings(ctx: &AppContext) -> AppResult<u64> {
    ctx.listing_manager.sweep_expired(Utc::now()).await
}

/// Downgrade accounts whose paid plan has lapsed
pub async fn reset_expired_plans(ctx: &AppContext) -> AppResult<u64> {
    ctx.account_manager.reset_expired_plans(Utc::now()).await
}

/// Expire Pending reports older than the configured retention
pub async fn expire_stale_reports(ctx: &AppContext) -> AppResult<u64> {
    ctx.moderation
        .expire_stale_reports(ctx.config.moderation.stale_report_days, Utc::now())
        .await
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        db,
        plans::Plan,
        test_support::{draft, seed_account, seed_category},
    };
    use chrono::Duration;

    async fn context() -> (AppContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::memory_pool().await.unwrap();
        let config = ServerConfig::for_tests(dir.path().to_path_buf());
        (AppContext::from_pool(config, pool), dir)
    }

    #[tokio::test]
    async fn test_tasks_on_empty_database() {
        let (ctx, _dir) = context().await;

        assert_eq!(sweep_expired_listings(&ctx).await.unwrap(), 0);
        assert_eq!(reset_expired_plans(&ctx).await.unwrap(), 0);
        assert_eq!(expire_stale_reports(&ctx).await.unwrap(), 0);
        health_check(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_task_expires_old_listing() {
        let (ctx, _dir) = context().await;
        let long_ago = Utc::now() - Duration::days(60);

        let owner = seed_account(&ctx.db, "237690000001", Plan::Free, long_ago).await;
        let cat = seed_category(&ctx.db, "Phones").await;
        ctx.listing_manager
            .publish(owner, draft(cat, "Forgotten"), long_ago)
            .await
            .unwrap();

        assert_eq!(sweep_expired_listings(&ctx).await.unwrap(), 1);
        assert_eq!(sweep_expired_listings(&ctx).await.unwrap(), 0);
    }
}
