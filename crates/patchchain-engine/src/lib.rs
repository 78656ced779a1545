//! Retry/advance loop over a chain of attempt directories.

pub mod controller;
pub mod escalator;
pub mod maintenance;

pub use controller::{AttemptLog, Controller, RunReport};
pub use escalator::{next_action, Action, Termination};
