//! Runtime harness to execute modules until the process is asked to terminate

mod heart;
mod module;

pub use heart::*;
pub use module::*;
