//! Public data model of the infinity supervisor.
//!
//! These types cross every boundary in the workspace: the HTTP surface decodes
//! [`PolicyDocument`]s, the registry stores [`Policy`] values next to their runners
//! and hands out [`RunnerState`] snapshots.
mod domain;
pub use domain::*;
