use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::sync::Arc;

/// Branches and their ledgers run on UTC+8 regardless of where the relay is hosted.
pub const BRANCH_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub fn branch_offset() -> FixedOffset {
    FixedOffset::east_opt(BRANCH_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

pub type ClockRef = Arc<dyn Clock>;

/// Wall clock shifted to the branch offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchClock;

impl Clock for BranchClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&branch_offset())
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}
