mod duration_nanos;
mod timestamp;

mod policy;
pub use policy::{Policy, PolicyDocument, PolicyName};

mod runner_status;
pub use runner_status::RunnerStatus;

mod runner_state;
pub use runner_state::RunnerState;

mod policy_view;
pub use policy_view::{PolicyView, PolicyViewDocument};

mod capabilities;
pub use capabilities::Capabilities;

mod supervisor_status;
pub use supervisor_status::SupervisorStatus;

/// Name of the worker binary as it appears in logs and error messages.
pub const WORKER_NAME: &str = "otelcol-contrib";
