//! Logging bootstrap for the infinity supervisor.
//!
//! Every crate in the workspace logs through `tracing`; this crate only decides
//! where the events go (text, json or journald) and at which level.
mod logger;
pub use logger::*;
