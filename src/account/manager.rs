/// Account manager implementation using runtime queries
use crate::{
    account::{
        is_valid_phone, Account, AuthResponse, ChangePasswordRequest, ConvertToShopRequest,
        EntitlementStatus, PlanCount, ProfileUpdate, RegisterRequest, TokenPair,
    },
    auth::{issue_token, verify_token, TokenKind},
    config::ServerConfig,
    error::{is_unique_violation, AppError, AppResult},
    metrics,
    pagination::{Page, PageRequest},
    plans::{month_key, EffectiveUsage, EntitlementPolicy, Plan, UsageSnapshot},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

const ACCOUNT_COLUMNS: &str = "id, name, phone, email, password_hash, city, quarter, is_shop, \
     shop_name, shop_description, plan, plan_expires_at, published_this_month, usage_month, \
     is_active, is_admin, created_at, last_login_at";

/// Attempts before giving up on a contended usage update
const USAGE_RETRIES: usize = 5;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    policy: Arc<EntitlementPolicy>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, policy: Arc<EntitlementPolicy>) -> Self {
        Self { db, config, policy }
    }

    /// Register a new account on the Free plan
    pub async fn register(&self, req: RegisterRequest, now: DateTime<Utc>) -> AppResult<Account> {
        req.validate()?;

        let phone = req.phone.trim().to_string();
        if !is_valid_phone(&phone) {
            return Err(AppError::Validation(
                "Phone number must be 237 followed by 9 digits".to_string(),
            ));
        }

        if !self.is_phone_available(&phone).await? {
            return Err(AppError::Conflict(format!("Phone {} already registered", phone)));
        }
        if !self.is_email_available(req.email.as_deref()).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&req.password)?;

        let result = sqlx::query(
            r#"
            INSERT INTO account (name, phone, email, password_hash, city, quarter, plan,
                                 published_this_month, usage_month, is_active, is_admin, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'free', 0, ?, 1, 0, ?)
            "#,
        )
        .bind(req.name.trim())
        .bind(&phone)
        .bind(&req.email)
        .bind(&password_hash)
        .bind(&req.city)
        .bind(&req.quarter)
        .bind(month_key(now))
        .bind(now)
        .execute(&self.db)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(format!("Phone {} already registered", phone)))
            }
            Err(e) => return Err(e.into()),
        };

        metrics::record_account_registered();
        info!("Registered account {} ({})", id, phone);

        self.get_account(id).await
    }

    /// Verify credentials and issue a token pair
    pub async fn login(
        &self,
        phone: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> AppResult<AuthResponse> {
        let account = self
            .find_by_phone(phone.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(password, &account.password_hash)? {
            warn!("Failed login for account {}", account.id);
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        if !account.is_active {
            return Err(AppError::AccountSuspended(
                "Account has been deactivated".to_string(),
            ));
        }

        sqlx::query("UPDATE account SET last_login_at = ? WHERE id = ?")
            .bind(now)
            .bind(account.id)
            .execute(&self.db)
            .await?;

        let tokens = self.issue_tokens(&account, now)?;
        let account = Account {
            last_login_at: Some(now),
            ..account
        };

        Ok(AuthResponse { account, tokens })
    }

    /// Sign an access/refresh token pair
    pub fn issue_tokens(&self, account: &Account, now: DateTime<Utc>) -> AppResult<TokenPair> {
        let auth = &self.config.authentication;
        Ok(TokenPair {
            access_token: issue_token(account.id, &account.phone, TokenKind::Access, auth, now)?,
            refresh_token: issue_token(account.id, &account.phone, TokenKind::Refresh, auth, now)?,
            token_type: "Bearer".to_string(),
            expires_in: auth.access_token_ttl_hours * 3600,
        })
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> AppResult<TokenPair> {
        let claims = verify_token(refresh_token, TokenKind::Refresh, &self.config.authentication)?;
        let account = self.active_account(claims.account_id()?).await?;
        self.issue_tokens(&account, now)
    }

    /// Resolve the account behind an access token
    pub async fn validate_access_token(&self, token: &str) -> AppResult<Account> {
        let claims = verify_token(token, TokenKind::Access, &self.config.authentication)?;
        self.active_account(claims.account_id()?).await
    }

    async fn active_account(&self, id: i64) -> AppResult<Account> {
        let account = match self.get_account(id).await {
            Ok(account) => account,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Authentication("Account no longer exists".to_string()))
            }
            Err(e) => return Err(e),
        };

        if !account.is_active {
            return Err(AppError::AccountSuspended(
                "Account has been deactivated".to_string(),
            ));
        }

        Ok(account)
    }

    /// Get account by id
    pub async fn get_account(&self, id: i64) -> AppResult<Account> {
        let row = sqlx::query(&format!("SELECT {} FROM account WHERE id = ?", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        Ok(parse_account(&row))
    }

    pub async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE phone = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.as_ref().map(parse_account))
    }

    pub async fn is_phone_available(&self, phone: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE phone = ?")
            .bind(phone)
            .fetch_one(&self.db)
            .await?;
        Ok(count == 0)
    }

    /// An absent or blank email is always available
    pub async fn is_email_available(&self, email: Option<&str>) -> AppResult<bool> {
        let email = match email.map(str::trim) {
            Some(email) if !email.is_empty() => email,
            _ => return Ok(true),
        };

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE LOWER(email) = LOWER(?)")
            .bind(email)
            .fetch_one(&self.db)
            .await?;
        Ok(count == 0)
    }

    /// Apply the fields present in `update`
    pub async fn update_profile(&self, id: i64, update: ProfileUpdate) -> AppResult<Account> {
        update.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE account
            SET name = COALESCE(?, name),
                email = COALESCE(?, email),
                city = COALESCE(?, city),
                quarter = COALESCE(?, quarter)
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.email)
        .bind(&update.city)
        .bind(&update.quarter)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        self.get_account(id).await
    }

    pub async fn convert_to_shop(&self, id: i64, req: ConvertToShopRequest) -> AppResult<Account> {
        req.validate()?;

        let result = sqlx::query(
            "UPDATE account SET is_shop = 1, shop_name = ?, shop_description = ? WHERE id = ?",
        )
        .bind(req.shop_name.trim())
        .bind(&req.shop_description)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        info!("Account {} converted to shop", id);
        self.get_account(id).await
    }

    /// Switch plan. Paid plans run for a fixed period from `now`; Free never expires.
    pub async fn change_plan(&self, id: i64, plan: Plan, now: DateTime<Utc>) -> AppResult<Account> {
        let expires_at = self.policy.plan_expiry(plan, now);

        let result = sqlx::query("UPDATE account SET plan = ?, plan_expires_at = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(expires_at)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        info!("Account {} switched to plan {}", id, plan.as_str());
        self.get_account(id).await
    }

    pub async fn change_password(&self, id: i64, req: ChangePasswordRequest) -> AppResult<()> {
        req.validate()?;
        let account = self.get_account(id).await?;

        if !verify_password(&req.old_password, &account.password_hash)? {
            return Err(AppError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = hash_password(&req.new_password)?;
        sqlx::query("UPDATE account SET password_hash = ? WHERE id = ?")
            .bind(&new_hash)
            .bind(id)
            .execute(&self.db)
            .await?;

        info!("Password changed for account {}", id);
        Ok(())
    }

    /// Activate or deactivate an account (admin)
    pub async fn set_active(&self, id: i64, active: bool) -> AppResult<Account> {
        let result = sqlx::query("UPDATE account SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Account {} not found", id)));
        }

        info!(
            "Account {} {}",
            id,
            if active { "activated" } else { "deactivated" }
        );
        self.get_account(id).await
    }

    /// Publishing rights at `now`, persisting any plan downgrade or monthly reset
    pub async fn entitlement_status(&self, id: i64, now: DateTime<Utc>) -> AppResult<EntitlementStatus> {
        for _ in 0..USAGE_RETRIES {
            let account = self.get_account(id).await?;
            let stored = account.usage();
            let effective = self.policy.effective_usage(&stored, now);

            if effective.differs_from_stored() {
                let mut conn = self.db.acquire().await?;
                if !store_usage(&mut conn, id, &stored, &effective).await? {
                    debug!("Usage of account {} changed concurrently, retrying", id);
                    continue;
                }
            }

            return Ok(EntitlementStatus {
                can_publish: self.policy.allows(&effective),
                plan: self.policy.plan_summary(effective.plan),
                plan_expires_at: effective.plan_expires_at,
                published_this_month: effective.published_this_month,
                remaining_this_month: self.policy.remaining(&effective),
            });
        }

        Err(AppError::Conflict(format!(
            "Usage of account {} is changing too quickly",
            id
        )))
    }

    /// Downgrade every account whose paid plan has lapsed
    pub async fn reset_expired_plans(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE account
            SET plan = 'free', plan_expires_at = NULL
            WHERE plan != 'free' AND plan_expires_at IS NOT NULL AND plan_expires_at < ?
            "#,
        )
        .bind(now)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            info!("Downgraded {} expired plans to free", result.rows_affected());
        }

        Ok(result.rows_affected())
    }

    pub async fn stats_by_plan(&self) -> AppResult<Vec<PlanCount>> {
        let rows = sqlx::query("SELECT plan, COUNT(*) AS accounts FROM account GROUP BY plan ORDER BY plan")
            .fetch_all(&self.db)
            .await?;

        Ok(rows
            .iter()
            .map(|row| PlanCount {
                plan: Plan::from_code(&row.get::<String, _>("plan")),
                accounts: row.get("accounts"),
            })
            .collect())
    }

    /// Shop accounts, newest first
    pub async fn list_shops(&self, page: PageRequest) -> AppResult<Page<Account>> {
        self.page_where("is_shop = 1 AND is_active = 1", &[], page).await
    }

    /// Accounts whose name, shop name or phone contains `keyword` (admin)
    pub async fn search_accounts(&self, keyword: &str, page: PageRequest) -> AppResult<Page<Account>> {
        let pattern = format!("%{}%", keyword.trim().to_lowercase());
        self.page_where(
            "(LOWER(name) LIKE ? OR LOWER(COALESCE(shop_name, '')) LIKE ? OR phone LIKE ?)",
            &[pattern.as_str(); 3],
            page,
        )
        .await
    }

    async fn page_where(
        &self,
        filter: &str,
        params: &[&str],
        page: PageRequest,
    ) -> AppResult<Page<Account>> {
        let page = page.normalized();

        let count_sql = format!("SELECT COUNT(*) FROM account WHERE {}", filter);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in params {
            count_query = count_query.bind(*param);
        }
        let total = count_query.fetch_one(&self.db).await?;

        let select_sql = format!(
            "SELECT {} FROM account WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            ACCOUNT_COLUMNS, filter
        );
        let mut query = sqlx::query(&select_sql);
        for param in params {
            query = query.bind(*param);
        }
        let rows = query
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(Page::new(rows.iter().map(parse_account).collect(), page, total))
    }
}

/// Compare-and-swap the usage columns of an account row.
///
/// Returns false when the row no longer matches `before`, i.e. a concurrent
/// writer got there first and the caller must re-read. The plan column is
/// matched on its raw stored text, so a code `Plan::from_code` folds into
/// Free still matches and is rewritten in canonical form.
pub(crate) async fn store_usage(
    conn: &mut SqliteConnection,
    account_id: i64,
    before: &UsageSnapshot,
    after: &EffectiveUsage,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE account
        SET plan = ?, plan_expires_at = ?, published_this_month = ?, usage_month = ?
        WHERE id = ?
          AND plan = ?
          AND plan_expires_at IS ?
          AND published_this_month = ?
          AND usage_month = ?
        "#,
    )
    .bind(after.plan.as_str())
    .bind(after.plan_expires_at)
    .bind(after.published_this_month)
    .bind(&after.usage_month)
    .bind(account_id)
    .bind(&before.stored_plan)
    .bind(before.plan_expires_at)
    .bind(before.published_this_month)
    .bind(&before.usage_month)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 && after.downgraded {
        info!("Plan of account {} expired, downgraded to free", account_id);
    }

    Ok(result.rows_affected() == 1)
}

pub(crate) fn parse_account(row: &SqliteRow) -> Account {
    let stored_plan: String = row.get("plan");
    Account {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        city: row.get("city"),
        quarter: row.get("quarter"),
        is_shop: row.get("is_shop"),
        shop_name: row.get("shop_name"),
        shop_description: row.get("shop_description"),
        plan: Plan::from_code(&stored_plan),
        stored_plan,
        plan_expires_at: row.get("plan_expires_at"),
        published_this_month: row.get("published_this_month"),
        usage_month: row.get("usage_month"),
        is_active: row.get("is_active"),
        is_admin: row.get("is_admin"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;

    async fn create_test_manager() -> AccountManager {
        let pool = db::memory_pool().await.unwrap();
        let config = Arc::new(ServerConfig::for_tests(PathBuf::from("./target/test-data")));
        AccountManager::new(pool, config, Arc::new(EntitlementPolicy::default()))
    }

    fn register_request(phone: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Awa Nkeng".to_string(),
            phone: phone.to_string(),
            password: "secret-password".to_string(),
            email: None,
            city: Some("Douala".to_string()),
            quarter: Some("Akwa".to_string()),
        }
    }

    fn march(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_register_starts_on_free_plan() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.plan_expires_at, None);
        assert_eq!(account.published_this_month, 0);
        assert_eq!(account.usage_month, "2024-03");
        assert!(account.is_active);
        assert!(!account.is_shop);
        assert_ne!(account.password_hash, "secret-password");
    }

    #[tokio::test]
    async fn test_register_duplicate_phone() {
        let manager = create_test_manager().await;
        manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        let result = manager
            .register(register_request("237690000001"), march(1))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_invalid_phone() {
        let manager = create_test_manager().await;
        let result = manager.register(register_request("0690000001"), march(1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_and_token_validation() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        let response = manager
            .login("237690000001", "secret-password", march(2))
            .await
            .unwrap();
        assert_eq!(response.account.last_login_at, Some(march(2)));

        let resolved = manager
            .validate_access_token(&response.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(resolved.id, account.id);

        let wrong = manager.login("237690000001", "bad-password", march(2)).await;
        assert!(matches!(wrong, Err(AppError::Authentication(_))));

        let unknown = manager.login("237690000009", "secret-password", march(2)).await;
        assert!(matches!(unknown, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_use_tokens() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        let tokens = manager.issue_tokens(&account, Utc::now()).unwrap();

        manager.set_active(account.id, false).await.unwrap();

        let result = manager.validate_access_token(&tokens.access_token).await;
        assert!(matches!(result, Err(AppError::AccountSuspended(_))));

        let login = manager.login("237690000001", "secret-password", march(2)).await;
        assert!(matches!(login, Err(AppError::AccountSuspended(_))));
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        let tokens = manager.issue_tokens(&account, Utc::now()).unwrap();

        let refreshed = manager.refresh(&tokens.refresh_token, Utc::now()).await.unwrap();
        assert!(manager.validate_access_token(&refreshed.access_token).await.is_ok());

        // An access token is not a refresh token
        assert!(manager.refresh(&tokens.access_token, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_change_plan_sets_and_clears_expiry() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        let pro = manager.change_plan(account.id, Plan::Pro, march(1)).await.unwrap();
        assert_eq!(pro.plan, Plan::Pro);
        assert_eq!(pro.plan_expires_at, Some(march(1) + Duration::days(30)));

        let free = manager.change_plan(account.id, Plan::Free, march(2)).await.unwrap();
        assert_eq!(free.plan, Plan::Free);
        assert_eq!(free.plan_expires_at, None);
    }

    #[tokio::test]
    async fn test_entitlement_status_persists_downgrade() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        manager.change_plan(account.id, Plan::Basic, march(1)).await.unwrap();

        let status = manager
            .entitlement_status(account.id, march(1) + Duration::days(31))
            .await
            .unwrap();
        assert_eq!(status.plan.code, Plan::Free);
        assert_eq!(status.remaining_this_month, Some(2));

        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.plan, Plan::Free);
        assert_eq!(stored.plan_expires_at, None);
        assert_eq!(stored.usage_month, "2024-04");
    }

    #[tokio::test]
    async fn test_reset_expired_plans() {
        let manager = create_test_manager().await;
        let a = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        let b = manager
            .register(register_request("237690000002"), march(1))
            .await
            .unwrap();
        manager.change_plan(a.id, Plan::Pro, march(1)).await.unwrap();
        manager.change_plan(b.id, Plan::Shop, march(20)).await.unwrap();

        let reset = manager.reset_expired_plans(march(1) + Duration::days(35)).await.unwrap();
        assert_eq!(reset, 1);
        assert_eq!(manager.get_account(a.id).await.unwrap().plan, Plan::Free);
        assert_eq!(manager.get_account(b.id).await.unwrap().plan, Plan::Shop);

        // Running again changes nothing
        let again = manager.reset_expired_plans(march(1) + Duration::days(35)).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_change_password_requires_old_password() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        let wrong = manager
            .change_password(
                account.id,
                ChangePasswordRequest {
                    old_password: "nope".to_string(),
                    new_password: "new-password".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(AppError::Authentication(_))));

        manager
            .change_password(
                account.id,
                ChangePasswordRequest {
                    old_password: "secret-password".to_string(),
                    new_password: "new-password".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(manager.login("237690000001", "new-password", march(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_and_shop_conversion() {
        let manager = create_test_manager().await;
        let account = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();

        let updated = manager
            .update_profile(
                account.id,
                ProfileUpdate {
                    city: Some("Yaoundé".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.city.as_deref(), Some("Yaoundé"));
        assert_eq!(updated.name, "Awa Nkeng");

        let shop = manager
            .convert_to_shop(
                account.id,
                ConvertToShopRequest {
                    shop_name: "Awa Électronique".to_string(),
                    shop_description: None,
                },
            )
            .await
            .unwrap();
        assert!(shop.is_shop);
        assert_eq!(shop.shop_name.as_deref(), Some("Awa Électronique"));
    }

    #[tokio::test]
    async fn test_email_availability() {
        let manager = create_test_manager().await;
        let with_email = RegisterRequest {
            email: Some("awa@example.cm".to_string()),
            ..register_request("237690000001")
        };
        manager.register(with_email.clone(), march(1)).await.unwrap();

        assert!(!manager.is_email_available(Some("AWA@example.cm")).await.unwrap());
        assert!(manager.is_email_available(Some("other@example.cm")).await.unwrap());
        assert!(manager.is_email_available(Some("  ")).await.unwrap());
        assert!(manager.is_email_available(None).await.unwrap());

        let taken = manager
            .register(
                RegisterRequest {
                    phone: "237690000002".to_string(),
                    ..with_email
                },
                march(1),
            )
            .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_shop_directory_and_account_search() {
        let manager = create_test_manager().await;
        let seller = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        manager
            .register(
                RegisterRequest {
                    name: "Paul Nana".to_string(),
                    ..register_request("237690000002")
                },
                march(1),
            )
            .await
            .unwrap();
        manager
            .convert_to_shop(
                seller.id,
                ConvertToShopRequest {
                    shop_name: "Mboa Phones".to_string(),
                    shop_description: None,
                },
            )
            .await
            .unwrap();

        let shops = manager.list_shops(PageRequest::default()).await.unwrap();
        assert_eq!(shops.total, 1);
        assert_eq!(shops.items[0].id, seller.id);

        let by_shop_name = manager.search_accounts("MBOA", PageRequest::default()).await.unwrap();
        assert_eq!(by_shop_name.total, 1);
        assert_eq!(by_shop_name.items[0].id, seller.id);

        let by_phone = manager.search_accounts("0000002", PageRequest::default()).await.unwrap();
        assert_eq!(by_phone.items[0].name, "Paul Nana");

        let everyone = manager.search_accounts("", PageRequest::new(0, 1)).await.unwrap();
        assert_eq!(everyone.total, 2);
        assert_eq!(everyone.items.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_by_plan() {
        let manager = create_test_manager().await;
        let a = manager
            .register(register_request("237690000001"), march(1))
            .await
            .unwrap();
        manager
            .register(register_request("237690000002"), march(1))
            .await
            .unwrap();
        manager.change_plan(a.id, Plan::Pro, march(1)).await.unwrap();

        let stats = manager.stats_by_plan().await.unwrap();
        let free = stats.iter().find(|s| s.plan == Plan::Free).unwrap();
        let pro = stats.iter().find(|s| s.plan == Plan::Pro).unwrap();
        assert_eq!(free.accounts, 1);
        assert_eq!(pro.accounts, 1);
    }
}
