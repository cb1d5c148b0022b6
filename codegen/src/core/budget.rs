//! Step budget tracking for a single activation.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{StepKind, StepRecord};

/// Smallest ceiling a configuration may declare.
pub const MIN_STEP_CEILING: u32 = 5;

/// Raised when a step would be recorded past the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("step ceiling reached ({used}/{ceiling})")]
pub struct BudgetExhausted {
    pub used: u32,
    pub ceiling: u32,
}

/// Counts billable steps against a hard ceiling.
///
/// Records are append-only and never exceed `ceiling`.
#[derive(Debug, Clone)]
pub struct StepBudget {
    ceiling: u32,
    started: Instant,
    records: Vec<StepRecord>,
}

impl StepBudget {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            started: Instant::now(),
            records: Vec::new(),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn used(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used())
    }

    /// True when one more step fits under the ceiling.
    pub fn has_room(&self) -> bool {
        self.used() < self.ceiling
    }

    /// True at or above 80% of the ceiling.
    pub fn near_limit(&self) -> bool {
        u64::from(self.used()) * 5 >= u64::from(self.ceiling) * 4
    }

    /// Record one step of `kind` and return its 1-indexed position.
    pub fn record_step(&mut self, kind: StepKind) -> Result<u32, BudgetExhausted> {
        if !self.has_room() {
            return Err(BudgetExhausted {
                used: self.used(),
                ceiling: self.ceiling,
            });
        }
        let index = self.used() + 1;
        self.records.push(StepRecord {
            index,
            kind,
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
        });
        debug!(index, ceiling = self.ceiling, ?kind, "step recorded");
        if self.near_limit() {
            warn!(
                used = index,
                ceiling = self.ceiling,
                "approaching step ceiling"
            );
        }
        Ok(index)
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_records_past_ceiling() {
        for ceiling in MIN_STEP_CEILING..40 {
            let mut budget = StepBudget::new(ceiling);
            let mut recorded = 0;
            for _ in 0..(ceiling * 2) {
                if budget.record_step(StepKind::Generation).is_ok() {
                    recorded += 1;
                }
            }
            assert_eq!(recorded, ceiling);
            assert_eq!(budget.records().len() as u32, ceiling);
            assert_eq!(budget.remaining(), 0);
            assert!(!budget.has_room());
        }
    }

    #[test]
    fn exhausted_error_reports_usage() {
        let mut budget = StepBudget::new(5);
        for _ in 0..5 {
            budget.record_step(StepKind::Generation).expect("record");
        }
        let err = budget.record_step(StepKind::Review).unwrap_err();
        assert_eq!(err, BudgetExhausted { used: 5, ceiling: 5 });
    }

    #[test]
    fn near_limit_starts_at_eighty_percent() {
        let mut budget = StepBudget::new(10);
        for _ in 0..7 {
            budget.record_step(StepKind::Generation).expect("record");
        }
        assert!(!budget.near_limit());
        budget.record_step(StepKind::Generation).expect("record");
        assert!(budget.near_limit());
        assert_eq!(budget.remaining(), 2);
    }

    #[test]
    fn records_are_indexed_in_order() {
        let mut budget = StepBudget::new(5);
        assert_eq!(budget.record_step(StepKind::Planning), Ok(1));
        assert_eq!(budget.record_step(StepKind::Generation), Ok(2));
        let kinds: Vec<StepKind> = budget.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![StepKind::Planning, StepKind::Generation]);
        assert!(budget.records()[0].elapsed_seconds <= budget.records()[1].elapsed_seconds);
    }
}
