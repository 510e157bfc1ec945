//! Per-user settings read by the scheduler and synchronizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable per-user flags.
///
/// The vacation flag is stored, not process state, so it survives
/// restarts and is shared by every scheduler instance. It gates all of a
/// user's listings without touching their per-listing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// Owning user
    pub user_id: Uuid,
    /// When set, every listing of this user is excluded from scheduling
    pub vacation_mode: bool,
    /// Last completed reconciliation; the freshness gate for sync calls
    pub last_reconciled_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    /// Default settings for a user seen for the first time
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            vacation_mode: false,
            last_reconciled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
