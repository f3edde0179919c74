use async_trait::async_trait;
use infinity_model::{Policy, PolicyView, SupervisorStatus};

use crate::error::ApiError;

/// Backend of the control surface.
///
/// [`crate::ControlPlaneAdapter`] is the production implementation; tests and
/// embedders can put their own logic behind the same routes.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    async fn status(&self) -> Result<SupervisorStatus, ApiError>;

    /// Worker self-description as JSON.
    async fn capabilities(&self) -> Result<serde_json::Value, ApiError>;

    async fn list_policies(&self) -> Result<Vec<String>, ApiError>;

    /// Start a policy; the returned view carries the submitted policy and its fresh state.
    async fn create_policy(&self, name: String, policy: Policy) -> Result<PolicyView, ApiError>;

    async fn get_policy(&self, name: &str) -> Result<Option<PolicyView>, ApiError>;

    async fn delete_policy(&self, name: &str, caller: &str) -> Result<(), ApiError>;
}
