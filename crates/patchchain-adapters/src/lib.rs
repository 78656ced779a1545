//! Runtime adapters for patchchain (configuration, process execution, the
//! rewriting tool's command lines).

pub mod config;
pub mod invoker;
pub mod util;
