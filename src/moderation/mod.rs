/// Listing moderation: reader reports, automatic and admin suspension
mod workflow;

pub use workflow::ModerationWorkflow;

use crate::{
    error::{AppError, AppResult},
    listings::ListingStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Why a listing was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    Spam,
    Scam,
    Inappropriate,
    Fake,
    SuspiciousPrice,
}

impl SignalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalReason::Spam => "spam",
            SignalReason::Scam => "scam",
            SignalReason::Inappropriate => "inappropriate",
            SignalReason::Fake => "fake",
            SignalReason::SuspiciousPrice => "suspicious_price",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "spam" => Ok(SignalReason::Spam),
            "scam" => Ok(SignalReason::Scam),
            "inappropriate" => Ok(SignalReason::Inappropriate),
            "fake" => Ok(SignalReason::Fake),
            "suspicious_price" => Ok(SignalReason::SuspiciousPrice),
            _ => Err(AppError::Validation(format!("Invalid report reason: {}", s))),
        }
    }
}

/// Review state of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Resolved,
    Rejected,
    /// Left unreviewed past the retention window
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Resolved => "resolved",
            SignalStatus::Rejected => "rejected",
            SignalStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SignalStatus::Pending),
            "resolved" => Ok(SignalStatus::Resolved),
            "rejected" => Ok(SignalStatus::Rejected),
            "expired" => Ok(SignalStatus::Expired),
            _ => Err(AppError::Validation(format!("Invalid report status: {}", s))),
        }
    }
}

/// Who changed a listing's moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationSource {
    /// Report threshold reached
    Auto,
    Admin,
}

impl ModerationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationSource::Auto => "auto",
            ModerationSource::Admin => "admin",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "auto" => ModerationSource::Auto,
            _ => ModerationSource::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Suspend,
    Reactivate,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Suspend => "suspend",
            ModerationAction::Reactivate => "reactivate",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "reactivate" => ModerationAction::Reactivate,
            _ => ModerationAction::Suspend,
        }
    }
}

/// Report filed against a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: i64,
    pub listing_id: i64,
    /// `None` for anonymous reports
    pub reporter_id: Option<i64>,
    pub reason: SignalReason,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_ip: Option<String>,
    pub status: SignalStatus,
    pub resolved_by: Option<i64>,
    pub resolution_comment: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Result of filing a report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub signal: Signal,
    /// Reports on the listing, including this one
    pub total_reports: i64,
    /// This report pushed the listing over the threshold
    pub listing_suspended: bool,
}

/// One suspension or reactivation of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationLogEntry {
    pub id: i64,
    pub listing_id: i64,
    pub action: ModerationAction,
    pub source: ModerationSource,
    pub actor_id: Option<i64>,
    pub reason: Option<String>,
    pub signal_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedListing {
    pub listing_id: i64,
    pub title: String,
    pub status: ListingStatus,
    pub report_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedAccount {
    pub account_id: i64,
    pub name: String,
    pub phone: String,
    pub report_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: SignalReason,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: SignalStatus,
    pub count: i64,
}

/// Report submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub listing_id: i64,
    pub reason: SignalReason,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Admin decision on a report
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// Admin suspension or reactivation of a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListingActionRequest {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}
