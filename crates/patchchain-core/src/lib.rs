//! Domain model for driving a rewriting tool over a chain of attempt
//! directories: step records, the directory store, outcome classification
//! and solver-log statistics.

pub mod chain;
pub mod error;
pub mod info;
pub mod outcome;
pub mod stats;
pub mod store;

pub use error::{ChainError, ChainResult, LogFormatError};
pub use info::{Circuit, CoefficientFile, InfoRecord};
pub use outcome::{AttemptOutcome, BudgetPolicy};
pub use store::{DirStore, MemoryStore, StepStore};
