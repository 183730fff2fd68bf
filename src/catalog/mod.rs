/// Reference data: categories, cities and their quarters
mod categories;
mod cities;

pub use categories::CategoryManager;
pub use cities::CityManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub name_en: Option<String>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Category with its number of Active listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub listing_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub name_en: Option<String>,
    #[validate(length(max = 10))]
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i64>,
}

/// Partial category edit
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub name_en: Option<String>,
    #[validate(length(max = 10))]
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quarter {
    pub id: i64,
    pub name: String,
    pub city_id: i64,
    pub is_active: bool,
}

/// City ranked by its number of Active listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularCity {
    #[serde(flatten)]
    pub city: City,
    pub active_listings: i64,
}

/// Quarter ranked by its number of Active listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularQuarter {
    #[serde(flatten)]
    pub quarter: Quarter,
    pub city_name: String,
    pub active_listings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CityRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 2, max = 100))]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuarterRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
}
