//! Reduction strategy model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::money::dec;

/// How a strategy derives the next price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Cut a fixed percentage of the current price each interval
    FixedPercentage,
    /// Cut a fixed currency amount each interval
    FixedAmount,
    /// Follow the competitor average downward
    MarketBased,
    /// Percentage cut that grows with how long the listing has sat unsold
    TimeBased,
}

impl StrategyKind {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::FixedPercentage => "fixed_percentage",
            StrategyKind::FixedAmount => "fixed_amount",
            StrategyKind::MarketBased => "market_based",
            StrategyKind::TimeBased => "time_based",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "fixed_percentage" => Ok(StrategyKind::FixedPercentage),
            "fixed_amount" => Ok(StrategyKind::FixedAmount),
            "market_based" => Ok(StrategyKind::MarketBased),
            "time_based" => Ok(StrategyKind::TimeBased),
            other => Err(Error::Internal(format!("Unknown strategy kind: {}", other))),
        }
    }
}

/// A named, reusable reduction rule owned by a user.
///
/// Read-only to the scheduler; created and edited through the surrounding
/// application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    /// Unique strategy id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Computation kind
    pub kind: StrategyKind,
    /// Percentage (1-50) for percentage kinds, currency (1-999) for fixed amount
    pub magnitude: Decimal,
    /// Days between reductions (1-365)
    pub interval_days: i32,
    /// Inactive strategies are never scheduled
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    /// Create a new strategy; the caller validates before persisting
    pub fn new(
        user_id: Uuid,
        name: String,
        kind: StrategyKind,
        magnitude: Decimal,
        interval_days: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            kind,
            magnitude,
            interval_days,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate magnitude and interval ranges.
    ///
    /// Rejected configurations never reach the strategy engine or the
    /// marketplace.
    pub fn validate(&self) -> Result<()> {
        if !(1..=365).contains(&self.interval_days) {
            return Err(Error::Validation(format!(
                "Strategy {} interval must be 1-365 days, got {}",
                self.name, self.interval_days
            )));
        }
        match self.kind {
            StrategyKind::FixedPercentage | StrategyKind::TimeBased | StrategyKind::MarketBased => {
                if self.magnitude < dec!(1) || self.magnitude > dec!(50) {
                    return Err(Error::Validation(format!(
                        "Strategy {} percentage must be 1-50, got {}",
                        self.name, self.magnitude
                    )));
                }
            }
            StrategyKind::FixedAmount => {
                if self.magnitude < dec!(1) || self.magnitude > dec!(999) {
                    return Err(Error::Validation(format!(
                        "Strategy {} amount must be 1-999, got {}",
                        self.name, self.magnitude
                    )));
                }
            }
        }
        Ok(())
    }
}
