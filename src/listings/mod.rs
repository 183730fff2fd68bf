/// Listings: models, lifecycle and search
mod manager;
pub mod search;

pub use manager::ListingManager;
pub(crate) use manager::{parse_listing, qualified_columns, reactivate_in_tx, suspend_in_tx};
pub use search::{SearchQuery, SearchService, SortField};

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Listing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
    Expired,
    Suspended,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Expired => "expired",
            ListingStatus::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ListingStatus::Active),
            "sold" => Ok(ListingStatus::Sold),
            "expired" => Ok(ListingStatus::Expired),
            "suspended" => Ok(ListingStatus::Suspended),
            _ => Err(AppError::Internal(format!("Invalid listing status: {}", s))),
        }
    }

    /// Sold and Expired are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListingStatus::Sold | ListingStatus::Expired)
    }
}

/// Item condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    VeryGood,
    #[default]
    Good,
    Fair,
    ForRepair,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::VeryGood => "very_good",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::ForRepair => "for_repair",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Condition::New),
            "very_good" => Ok(Condition::VeryGood),
            "good" => Ok(Condition::Good),
            "fair" => Ok(Condition::Fair),
            "for_repair" => Ok(Condition::ForRepair),
            _ => Err(AppError::Validation(format!("Invalid condition: {}", s))),
        }
    }
}

/// Stored listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub price: Option<i64>,
    pub negotiable: bool,
    pub condition: Condition,
    pub city: String,
    pub quarter: Option<String>,
    pub address: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub delivery_on_site: bool,
    pub delivery_home: bool,
    pub delivery_station: bool,
    pub payment_cash: bool,
    pub payment_mobile_money: bool,
    pub payment_transfer: bool,
    pub is_premium: bool,
    pub is_urgent: bool,
    pub views: i64,
    pub contacts: i64,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_boosted_at: Option<DateTime<Utc>>,
}

/// Fields supplied when publishing
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub category_id: i64,
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    pub negotiable: Option<bool>,
    pub condition: Option<Condition>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub quarter: Option<String>,
    #[validate(length(max = 300))]
    pub address: Option<String>,
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub delivery_on_site: Option<bool>,
    pub delivery_home: Option<bool>,
    pub delivery_station: Option<bool>,
    pub payment_cash: Option<bool>,
    pub payment_mobile_money: Option<bool>,
    pub payment_transfer: Option<bool>,
    pub is_urgent: Option<bool>,
}

/// Owner edit; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingUpdate {
    #[validate(length(min = 3, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    pub negotiable: Option<bool>,
    pub condition: Option<Condition>,
    #[validate(length(max = 300))]
    pub address: Option<String>,
}

/// Listing count grouped by a key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountBy {
    pub key: String,
    pub count: i64,
}
