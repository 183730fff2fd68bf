/// Configuration management for the marketplace service
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub moderation: ModerationConfig,
    pub jobs: JobsConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub image_directory: PathBuf,
    /// Largest accepted image upload, in bytes
    pub image_upload_limit: usize,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_ttl_hours: i64,
    pub refresh_token_ttl_days: i64,
    /// Phone numbers granted the admin role regardless of the account flag
    pub admin_phones: Vec<String>,
}

/// Moderation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Number of signals on one listing that triggers automatic suspension
    pub auto_suspend_threshold: i64,
    /// Pending signals older than this are expired by the housekeeping job
    pub stale_report_days: i64,
}

/// Background job intervals, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub enabled: bool,
    pub listing_sweep_interval: u64,
    pub plan_reset_interval: u64,
    pub stale_report_interval: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub admin_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" switches the subscriber to structured output
    pub format: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("ANNONCES_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ANNONCES_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();

        let data_directory: PathBuf = env::var("ANNONCES_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("ANNONCES_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("annonces.sqlite"));
        let image_directory = env::var("ANNONCES_IMAGE_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("images"));
        let image_upload_limit = env_or("ANNONCES_IMAGE_UPLOAD_LIMIT", 5 * 1024 * 1024);
        let max_connections = env_or("ANNONCES_DB_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("ANNONCES_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let issuer =
            env::var("ANNONCES_JWT_ISSUER").unwrap_or_else(|_| "annonces-platform".to_string());

        // Parse admin phones from comma-separated list
        let admin_phones = env::var("ANNONCES_ADMIN_PHONES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                image_directory,
                image_upload_limit,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                issuer,
                access_token_ttl_hours: env_or("ANNONCES_ACCESS_TOKEN_TTL_HOURS", 24),
                refresh_token_ttl_days: env_or("ANNONCES_REFRESH_TOKEN_TTL_DAYS", 7),
                admin_phones,
            },
            moderation: ModerationConfig {
                auto_suspend_threshold: env_or("ANNONCES_AUTO_SUSPEND_THRESHOLD", 3),
                stale_report_days: env_or("ANNONCES_STALE_REPORT_DAYS", 30),
            },
            jobs: JobsConfig {
                enabled: env_or("ANNONCES_JOBS_ENABLED", true),
                listing_sweep_interval: env_or("ANNONCES_LISTING_SWEEP_INTERVAL", 3600),
                plan_reset_interval: env_or("ANNONCES_PLAN_RESET_INTERVAL", 3600),
                stale_report_interval: env_or("ANNONCES_STALE_REPORT_INTERVAL", 86400),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("ANNONCES_RATE_LIMITS_ENABLED", true),
                authenticated_rps: env_or("ANNONCES_RATE_LIMIT_AUTHENTICATED_RPS", 100),
                unauthenticated_rps: env_or("ANNONCES_RATE_LIMIT_UNAUTHENTICATED_RPS", 20),
                admin_rps: env_or("ANNONCES_RATE_LIMIT_ADMIN_RPS", 1000),
                burst_size: env_or("ANNONCES_RATE_LIMIT_BURST", 50),
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.access_token_ttl_hours <= 0
            || self.authentication.refresh_token_ttl_days <= 0
        {
            return Err(AppError::Validation(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        if self.moderation.auto_suspend_threshold < 1 {
            return Err(AppError::Validation(
                "Auto-suspend threshold must be at least 1".to_string(),
            ));
        }

        if self.jobs.listing_sweep_interval == 0
            || self.jobs.plan_reset_interval == 0
            || self.jobs.stale_report_interval == 0
        {
            return Err(AppError::Validation(
                "Job intervals must be positive".to_string(),
            ));
        }

        if self.storage.image_upload_limit == 0 {
            return Err(AppError::Validation(
                "Image upload limit must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration suitable for tests: in-memory friendly paths and a fixed secret
    pub fn for_tests(data_directory: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                version: "test".to_string(),
            },
            storage: StorageConfig {
                database: data_directory.join("annonces.sqlite"),
                image_directory: data_directory.join("images"),
                data_directory,
                image_upload_limit: 5 * 1024 * 1024,
                max_connections: 5,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                issuer: "annonces-test".to_string(),
                access_token_ttl_hours: 24,
                refresh_token_ttl_days: 7,
                admin_phones: vec![],
            },
            moderation: ModerationConfig {
                auto_suspend_threshold: 3,
                stale_report_days: 30,
            },
            jobs: JobsConfig {
                enabled: false,
                listing_sweep_interval: 3600,
                plan_reset_interval: 3600,
                stale_report_interval: 86400,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                authenticated_rps: 100,
                unauthenticated_rps: 20,
                admin_rps: 1000,
                burst_size: 50,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_tests_is_valid() {
        let config = ServerConfig::for_tests(PathBuf::from("./target/test-data"));
        assert!(config.validate().is_ok());
        assert_eq!(config.moderation.auto_suspend_threshold, 3);
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_tests(PathBuf::from("./target/test-data"));
        config.authentication.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = ServerConfig::for_tests(PathBuf::from("./target/test-data"));
        config.moderation.auto_suspend_threshold = 0;
        assert!(config.validate().is_err());
    }
}
