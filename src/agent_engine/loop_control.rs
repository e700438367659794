// Loop guards: repeated-target detection and the consecutive-failure budget.
use std::collections::VecDeque;

use crate::agent_engine::state::Coordinates;

/// Recent targets remembered for stall detection.
pub const RECENT_CAPACITY: usize = 3;

/// Repeats that trigger a context reset.
pub const STALL_THRESHOLD: u32 = 3;

/// Notices when the model keeps proposing the same target.
#[derive(Debug, Clone, Default)]
pub struct StallDetector {
    recent: VecDeque<Coordinates>,
    repeat_count: u32,
}

impl StallDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposed target. Returns `true` when the caller must reset
    /// its decision context; the detector has already reset itself.
    pub fn observe(&mut self, coordinates: Coordinates) -> bool {
        if self.recent.contains(&coordinates) {
            self.repeat_count += 1;
        } else {
            if self.recent.len() == RECENT_CAPACITY {
                self.recent.pop_front();
            }
            self.recent.push_back(coordinates);
            self.repeat_count = 1;
        }

        if self.repeat_count >= STALL_THRESHOLD {
            tracing::warn!(
                repeats = self.repeat_count,
                "same target proposed repeatedly, resetting context"
            );
            self.recent.clear();
            self.repeat_count = 0;
            return true;
        }
        false
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }
}

/// Bounds recorded failures in a row.
#[derive(Debug, Clone)]
pub struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    /// `limit` of 0 disables the budget.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns `true` once the budget is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.limit > 0 && self.consecutive >= self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
