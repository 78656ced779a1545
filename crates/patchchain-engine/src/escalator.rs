use patchchain_core::outcome::{AttemptOutcome, BudgetPolicy};
use std::fmt;

/// What the controller does after classifying an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Re-run `step` in place with the larger budget.
    Retry { step: usize, budget: u32 },
    /// Open a new step from `from`'s output.
    Advance { from: usize },
    Terminate(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    PatchFound { step: usize },
    /// The escalated budget `rejected` would have exceeded the cap.
    BudgetExhausted { step: usize, rejected: u64 },
}

impl Termination {
    pub fn step(&self) -> usize {
        match self {
            Termination::PatchFound { step } | Termination::BudgetExhausted { step, .. } => *step,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::PatchFound { step } => write!(f, "patch found at step {}", step),
            Termination::BudgetExhausted { step, rejected } => write!(
                f,
                "budget exhausted at step {} (next budget {} exceeds the cap)",
                step, rejected
            ),
        }
    }
}

pub fn next_action(
    outcome: AttemptOutcome,
    step: usize,
    budget: u32,
    policy: &BudgetPolicy,
) -> Action {
    match outcome {
        AttemptOutcome::ConflictTestFailed | AttemptOutcome::NoPatchFound => {
            match policy.next_within_cap(budget) {
                Some(next) => Action::Retry { step, budget: next },
                None => Action::Terminate(Termination::BudgetExhausted {
                    step,
                    rejected: policy.escalate(budget),
                }),
            }
        }
        AttemptOutcome::PatchFound => Action::Terminate(Termination::PatchFound { step }),
        AttemptOutcome::Advance => Action::Advance { from: step },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_retry_same_step_with_larger_budget() {
        let policy = BudgetPolicy::default();
        for outcome in [AttemptOutcome::ConflictTestFailed, AttemptOutcome::NoPatchFound] {
            assert_eq!(
                next_action(outcome, 3, 1500, &policy),
                Action::Retry { step: 3, budget: 1800 }
            );
        }
    }

    #[test]
    fn patch_found_is_terminal() {
        let action = next_action(AttemptOutcome::PatchFound, 2, 1500, &BudgetPolicy::default());
        assert_eq!(action, Action::Terminate(Termination::PatchFound { step: 2 }));
    }

    #[test]
    fn final_artifact_advances() {
        let action = next_action(AttemptOutcome::Advance, 4, 1500, &BudgetPolicy::default());
        assert_eq!(action, Action::Advance { from: 4 });
    }

    #[test]
    fn budget_over_cap_terminates() {
        let action = next_action(
            AttemptOutcome::NoPatchFound,
            1,
            9000,
            &BudgetPolicy::default(),
        );
        assert_eq!(
            action,
            Action::Terminate(Termination::BudgetExhausted {
                step: 1,
                rejected: 10800
            })
        );
    }
}
