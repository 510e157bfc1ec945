//! Price reduction history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::money::Price;

/// What initiated a reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionTrigger {
    /// User action through the surrounding application
    Manual,
    /// The reduction scheduler
    Scheduled,
}

impl ReductionTrigger {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionTrigger::Manual => "manual",
            ReductionTrigger::Scheduled => "scheduled",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(ReductionTrigger::Manual),
            "scheduled" => Ok(ReductionTrigger::Scheduled),
            other => Err(Error::Internal(format!("Unknown reduction trigger: {}", other))),
        }
    }
}

/// Immutable append-only record of one committed price change.
///
/// Events outlive their listing's active life; a soft-closed listing
/// keeps its history queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceReductionEvent {
    /// Unique event id
    pub id: Uuid,
    /// Listing the reduction applied to
    pub listing_id: Uuid,
    /// Price before the reduction
    pub old_price: Price,
    /// Price after the reduction
    pub new_price: Price,
    /// Strategy that produced the reduction, if scheduled
    pub strategy_id: Option<Uuid>,
    /// Manual or scheduled
    pub trigger: ReductionTrigger,
    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

impl PriceReductionEvent {
    /// Record a committed reduction
    pub fn record(
        listing_id: Uuid,
        old_price: Price,
        new_price: Price,
        strategy_id: Option<Uuid>,
        trigger: ReductionTrigger,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id,
            old_price,
            new_price,
            strategy_id,
            trigger,
            created_at: Utc::now(),
        }
    }
}
