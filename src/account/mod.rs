/// Account management
///
/// Registration, login, profile, shop conversion and plan subscriptions.
mod manager;

pub use manager::AccountManager;
pub(crate) use manager::store_usage;

use crate::plans::{Plan, PlanSummary, UsageSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stored account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub city: Option<String>,
    pub quarter: Option<String>,
    pub is_shop: bool,
    pub shop_name: Option<String>,
    pub shop_description: Option<String>,
    pub plan: Plan,
    #[serde(skip)]
    pub stored_plan: String,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub published_this_month: i64,
    pub usage_month: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn usage(&self) -> UsageSnapshot {
        UsageSnapshot {
            plan: self.plan,
            stored_plan: self.stored_plan.clone(),
            plan_expires_at: self.plan_expires_at,
            published_this_month: self.published_this_month,
            usage_month: self.usage_month.clone(),
        }
    }
}

/// Cameroonian mobile number: `237` followed by nine digits
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 12 && phone.starts_with("237") && phone.bytes().all(|b| b.is_ascii_digit())
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    pub phone: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
    pub city: Option<String>,
    pub quarter: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Issued bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login / registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub account: Account,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Partial profile update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub city: Option<String>,
    pub quarter: Option<String>,
}

/// Shop conversion request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConvertToShopRequest {
    #[validate(length(min = 2, max = 100))]
    pub shop_name: String,
    #[validate(length(max = 1000))]
    pub shop_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Current publishing rights of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementStatus {
    pub can_publish: bool,
    pub plan: PlanSummary,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub published_this_month: i64,
    /// `None` means unlimited
    pub remaining_this_month: Option<i64>,
}

/// Number of accounts on each plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCount {
    pub plan: Plan,
    pub accounts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_format() {
        assert!(is_valid_phone("237690000001"));
        assert!(!is_valid_phone("690000001"));
        assert!(!is_valid_phone("23769000000a"));
        assert!(!is_valid_phone("2376900000011"));
        assert!(!is_valid_phone("+23769000000"));
    }
}
