pub mod error;
pub use error::{CoreError, CoreResult};

pub mod config;
pub use config::InfinityConfig;

pub mod registry;
pub use registry::PolicyRegistry;

pub mod control_plane;
pub use control_plane::ControlPlane;

pub mod system;
