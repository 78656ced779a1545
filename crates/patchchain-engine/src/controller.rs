use crate::escalator::{next_action, Action, Termination};
use anyhow::{Context, Result};
use patchchain_adapters::invoker::{Invoker, ToolRunner};
use patchchain_core::chain::{create_step, latest_step, read_info, write_info};
use patchchain_core::info::InfoRecord;
use patchchain_core::outcome::{classify_step, AttemptOutcome, BudgetPolicy};
use patchchain_core::store::StepStore;
use tracing::info;

/// One tool invocation and how it was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptLog {
    pub step: usize,
    pub budget: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub seed_step: usize,
    pub steps_created: usize,
    pub retries: usize,
    pub attempts: Vec<AttemptLog>,
    pub termination: Termination,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "{}; {} step(s) created from step {}, {} attempt(s), {} retr{}",
            self.termination,
            self.steps_created,
            self.seed_step,
            self.attempts.len(),
            self.retries,
            if self.retries == 1 { "y" } else { "ies" }
        )
    }
}

/// Drives one chain: advance from the latest step, run, classify, and
/// either retry, advance again, or stop.
pub struct Controller<S, I> {
    store: S,
    runner: ToolRunner<I>,
    policy: BudgetPolicy,
}

impl<S: StepStore, I: Invoker> Controller<S, I> {
    pub fn new(store: S, runner: ToolRunner<I>, policy: BudgetPolicy) -> Self {
        Self {
            store,
            runner,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn run(&mut self) -> Result<RunReport> {
        let seed_step = latest_step(&self.store)?;
        let mut record = read_info(&self.store, seed_step)
            .with_context(|| format!("Failed to read info record of step {}", seed_step))?;
        let mut step = seed_step;
        let mut action = Action::Advance { from: seed_step };

        let mut steps_created = 0;
        let mut retries = 0;
        let mut attempts = Vec::new();

        let termination = loop {
            match action {
                Action::Advance { from } => {
                    let (id, _, next) = create_step(&mut self.store, &record)
                        .with_context(|| format!("Failed to advance from step {}", from))?;
                    step = id;
                    record = next;
                    steps_created += 1;
                }
                Action::Retry { step: id, budget } => {
                    record.budget = budget;
                    write_info(&mut self.store, id, &record)?;
                    info!(step = id, budget, "budget updated to {}", budget);
                    retries += 1;
                }
                Action::Terminate(termination) => break termination,
            }

            let outcome = self.attempt(step, &record)?;
            attempts.push(AttemptLog {
                step,
                budget: record.budget,
                outcome,
            });
            action = next_action(outcome, step, record.budget, &self.policy);

            if let Action::Terminate(Termination::BudgetExhausted { rejected, .. }) = action {
                info!(step, "budget updated to {}, above cap {}", rejected, self.policy.cap);
            }
        };

        info!(step = termination.step(), "{}", termination);
        Ok(RunReport {
            seed_step,
            steps_created,
            retries,
            attempts,
            termination,
        })
    }

    fn attempt(&self, step: usize, record: &InfoRecord) -> Result<AttemptOutcome> {
        let dir = self.store.step_dir(step);
        self.runner
            .run_attempt(&dir, record)
            .with_context(|| format!("Attempt in step {} failed", step))?;
        let outcome = classify_step(&self.store, step)?;
        info!(step, budget = record.budget, outcome = outcome.as_str(), "attempt classified");
        Ok(outcome)
    }
}
