/// Subscription plans and the entitlement policy
///
/// The policy is a pure function of (plan, monthly usage, time). It never
/// touches the database; callers persist the downgrades and counter resets
/// it computes.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Shop,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Basic, Plan::Pro, Plan::Shop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Shop => "shop",
        }
    }

    /// Lookup by tier code. Unknown codes fall back to Free.
    pub fn from_code(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "basic" => Plan::Basic,
            "pro" => Plan::Pro,
            "shop" => Plan::Shop,
            _ => Plan::Free,
        }
    }

    /// Strict parse for client input
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(Plan::Free),
            "basic" => Some(Plan::Basic),
            "pro" => Some(Plan::Pro),
            "shop" => Some(Plan::Shop),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Basic => "Basic",
            Plan::Pro => "Pro",
            Plan::Shop => "Shop",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

/// One value per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTable<T> {
    pub free: T,
    pub basic: T,
    pub pro: T,
    pub shop: T,
}

impl<T: Copy> PlanTable<T> {
    pub fn get(&self, plan: Plan) -> T {
        match plan {
            Plan::Free => self.free,
            Plan::Basic => self.basic,
            Plan::Pro => self.pro,
            Plan::Shop => self.shop,
        }
    }
}

/// Per-account usage as stored on the account row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub plan: Plan,
    /// Plan column exactly as stored; usage writes compare against it
    pub stored_plan: String,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub published_this_month: i64,
    /// Calendar month (`YYYY-MM`) the counter belongs to
    pub usage_month: String,
}

/// Usage after applying plan expiry and the monthly rollover for a given instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveUsage {
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub published_this_month: i64,
    pub usage_month: String,
    /// The stored plan had expired and was replaced by Free
    pub downgraded: bool,
    /// The stored counter belonged to an earlier month and was reset
    pub month_rolled: bool,
}

impl EffectiveUsage {
    /// Whether the snapshot must be written back to match this view
    pub fn differs_from_stored(&self) -> bool {
        self.downgraded || self.month_rolled
    }
}

/// Display metadata for a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub code: Plan,
    pub name: String,
    pub monthly_price: u32,
    /// `None` means unlimited
    pub monthly_publish_limit: Option<u32>,
    pub max_photos: u32,
    /// Photo allowance advertised on the plan page, `None` means unlimited
    pub advertised_photos: Option<u32>,
    pub listing_lifetime_days: i64,
}

/// Calendar month key for an instant
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Plan-based entitlement rules
///
/// The publish caps, the enforced photo limits and the advertised photo
/// allowances are independent tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementPolicy {
    /// Monthly publish cap, `None` = unlimited
    pub publish_limits: PlanTable<Option<u32>>,
    /// Photos accepted per listing at upload time
    pub max_photos: PlanTable<u32>,
    /// Photos shown on the plan comparison page, `None` = unlimited
    pub advertised_photos: PlanTable<Option<u32>>,
    pub lifetime_days: PlanTable<i64>,
    pub monthly_price: PlanTable<u32>,
    /// Validity of a paid plan after purchase
    pub paid_plan_days: i64,
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            publish_limits: PlanTable {
                free: Some(2),
                basic: Some(5),
                pro: Some(15),
                shop: None,
            },
            max_photos: PlanTable {
                free: 2,
                basic: 5,
                pro: 10,
                shop: 20,
            },
            advertised_photos: PlanTable {
                free: Some(2),
                basic: Some(5),
                pro: Some(15),
                shop: None,
            },
            lifetime_days: PlanTable {
                free: 14,
                basic: 30,
                pro: 60,
                shop: 90,
            },
            monthly_price: PlanTable {
                free: 0,
                basic: 500,
                pro: 2000,
                shop: 4000,
            },
            paid_plan_days: 30,
        }
    }
}

impl EntitlementPolicy {
    /// Plan in force at `now`: an expired plan counts as Free
    pub fn effective_plan(&self, usage: &UsageSnapshot, now: DateTime<Utc>) -> Plan {
        match usage.plan_expires_at {
            Some(expires_at) if expires_at < now => Plan::Free,
            _ => usage.plan,
        }
    }

    /// Apply plan expiry and the lazy monthly reset
    pub fn effective_usage(&self, usage: &UsageSnapshot, now: DateTime<Utc>) -> EffectiveUsage {
        let plan = self.effective_plan(usage, now);
        let downgraded = plan != usage.plan;
        let current_month = month_key(now);
        let month_rolled = current_month != usage.usage_month;

        EffectiveUsage {
            plan,
            plan_expires_at: if downgraded { None } else { usage.plan_expires_at },
            published_this_month: if month_rolled { 0 } else { usage.published_this_month },
            usage_month: current_month,
            downgraded,
            month_rolled,
        }
    }

    /// Whether one more listing fits in the plan's monthly cap
    pub fn allows(&self, usage: &EffectiveUsage) -> bool {
        match self.publish_limits.get(usage.plan) {
            None => true,
            Some(limit) => usage.published_this_month < i64::from(limit),
        }
    }

    pub fn can_publish(&self, usage: &UsageSnapshot, now: DateTime<Utc>) -> bool {
        self.allows(&self.effective_usage(usage, now))
    }

    /// Usage after charging one publish
    pub fn charge(&self, usage: &EffectiveUsage) -> EffectiveUsage {
        EffectiveUsage {
            published_this_month: usage.published_this_month + 1,
            ..usage.clone()
        }
    }

    /// Remaining publishes this month, `None` = unlimited
    pub fn remaining(&self, usage: &EffectiveUsage) -> Option<i64> {
        self.publish_limits
            .get(usage.plan)
            .map(|limit| (i64::from(limit) - usage.published_this_month).max(0))
    }

    pub fn publish_limit(&self, plan: Plan) -> Option<u32> {
        self.publish_limits.get(plan)
    }

    pub fn max_photos(&self, plan: Plan) -> u32 {
        self.max_photos.get(plan)
    }

    pub fn listing_lifetime_days(&self, plan: Plan) -> i64 {
        self.lifetime_days.get(plan)
    }

    /// Expiry of a plan bought at `now`; Free never expires
    pub fn plan_expiry(&self, plan: Plan, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if plan.is_paid() {
            Some(now + chrono::Duration::days(self.paid_plan_days))
        } else {
            None
        }
    }

    pub fn plan_summary(&self, plan: Plan) -> PlanSummary {
        PlanSummary {
            code: plan,
            name: plan.display_name().to_string(),
            monthly_price: self.monthly_price.get(plan),
            monthly_publish_limit: self.publish_limits.get(plan),
            max_photos: self.max_photos.get(plan),
            advertised_photos: self.advertised_photos.get(plan),
            listing_lifetime_days: self.lifetime_days.get(plan),
        }
    }

    pub fn catalog(&self) -> Vec<PlanSummary> {
        Plan::ALL.iter().map(|p| self.plan_summary(*p)).collect()
    }
}
