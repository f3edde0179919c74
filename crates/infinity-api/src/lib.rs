mod error;
pub use error::ApiError;

mod handler;
pub use handler::ApiHandler;

mod adapter;
pub use adapter::ControlPlaneAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpApi, YAML_CONTENT_TYPE};

#[cfg(feature = "http")]
pub use axum;
