//! Attempt classification and conflict-budget escalation.

use crate::error::{ChainError, ChainResult};
use crate::store::{StepStore, FINAL_ARTIFACT, RESULT_LOG};

pub const MARKER_CONFLICT_TEST_FAILED: &str = "conflict test failed";
pub const MARKER_PATCH_FOUND: &str = "PO patch is found";
pub const MARKER_NO_PATCH: &str = "no patch is found";

pub const DEFAULT_BUDGET_GROWTH: f64 = 1.2;
pub const DEFAULT_BUDGET_CAP: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    ConflictTestFailed,
    PatchFound,
    NoPatchFound,
    Advance,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::ConflictTestFailed => "conflict_test_failed",
            AttemptOutcome::PatchFound => "patch_found",
            AttemptOutcome::NoPatchFound => "no_patch_found",
            AttemptOutcome::Advance => "advance",
        }
    }
}

/// Markers are checked over the whole log in priority order, so a conflict
/// failure anywhere outranks a patch report anywhere. `None` when the log
/// carries no marker at all.
pub fn classify_log(text: &str) -> Option<AttemptOutcome> {
    if text.contains(MARKER_CONFLICT_TEST_FAILED) {
        Some(AttemptOutcome::ConflictTestFailed)
    } else if text.contains(MARKER_PATCH_FOUND) {
        Some(AttemptOutcome::PatchFound)
    } else if text.contains(MARKER_NO_PATCH) {
        Some(AttemptOutcome::NoPatchFound)
    } else {
        None
    }
}

/// Classify a finished attempt. Without a marker the tool must have left a
/// final artifact behind.
pub fn classify_step<S: StepStore + ?Sized>(store: &S, id: usize) -> ChainResult<AttemptOutcome> {
    let log = store.read_text(id, RESULT_LOG)?.unwrap_or_default();
    if let Some(outcome) = classify_log(&log) {
        return Ok(outcome);
    }
    if store.exists(id, FINAL_ARTIFACT) {
        Ok(AttemptOutcome::Advance)
    } else {
        Err(ChainError::InvariantViolation {
            id,
            artifact: FINAL_ARTIFACT.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    pub growth: f64,
    pub cap: u32,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            growth: DEFAULT_BUDGET_GROWTH,
            cap: DEFAULT_BUDGET_CAP,
        }
    }
}

impl BudgetPolicy {
    /// Next budget after a failed attempt, never less than `current + 1`.
    pub fn escalate(&self, current: u32) -> u64 {
        let scaled = (current as f64 * self.growth).round() as u64;
        scaled.max(current as u64 + 1)
    }

    /// `None` once the escalated budget would exceed the cap.
    pub fn next_within_cap(&self, current: u32) -> Option<u32> {
        let next = self.escalate(current);
        if next > self.cap as u64 {
            None
        } else {
            u32::try_from(next).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn conflict_failure_outranks_patch_on_same_line() {
        let log = "PO patch is found after conflict test failed\n";
        assert_eq!(classify_log(log), Some(AttemptOutcome::ConflictTestFailed));
    }

    #[test]
    fn conflict_failure_wins_when_both_markers_present() {
        let log = "starting\nconflict test failed\nPO patch is found\n";
        assert_eq!(classify_log(log), Some(AttemptOutcome::ConflictTestFailed));
    }

    #[test]
    fn later_conflict_failure_outranks_earlier_markers() {
        let log = "PO patch is found\nconflict test failed\n";
        assert_eq!(classify_log(log), Some(AttemptOutcome::ConflictTestFailed));
        let log = "no patch is found\nconflict test failed\n";
        assert_eq!(classify_log(log), Some(AttemptOutcome::ConflictTestFailed));
    }

    #[test]
    fn patch_found_outranks_no_patch() {
        let log = "no patch is found\nretrying\nPO patch is found\n";
        assert_eq!(classify_log(log), Some(AttemptOutcome::PatchFound));
        assert_eq!(classify_log("no patch is found\n"), Some(AttemptOutcome::NoPatchFound));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert_eq!(classify_log("Conflict Test Failed\npo patch is found\n"), None);
    }

    #[test]
    fn missing_marker_requires_final_artifact() {
        let mut store = MemoryStore::new("/runs/x");
        store.put_file(0, RESULT_LOG, b"rewriting done\n".to_vec());
        let err = classify_step(&store, 0).unwrap_err();
        assert!(matches!(err, ChainError::InvariantViolation { id: 0, .. }));

        store.put_file(0, FINAL_ARTIFACT, b"aig".to_vec());
        assert_eq!(classify_step(&store, 0).unwrap(), AttemptOutcome::Advance);
    }

    #[test]
    fn escalation_rounds_scaled_budget() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.escalate(1500), 1800);
        assert_eq!(policy.escalate(1800), 2160);
        assert_eq!(policy.escalate(2160), 2592);
        assert_eq!(policy.escalate(7), 8);
        assert_eq!(policy.escalate(8), 10);
    }

    #[test]
    fn escalation_never_stalls_on_small_budgets() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.escalate(1), 2);
        assert_eq!(policy.escalate(2), 3);
    }

    #[test]
    fn cap_stops_escalation() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.escalate(9000), 10800);
        assert_eq!(policy.next_within_cap(9000), None);
        assert_eq!(policy.next_within_cap(8332), Some(9998));
        assert_eq!(policy.next_within_cap(8333), None);
    }
}
