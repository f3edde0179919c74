use std::sync::Arc;

use async_trait::async_trait;
use infinity_core::ControlPlane;
use infinity_model::{Policy, PolicyView, SupervisorStatus};

use crate::{error::ApiError, handler::ApiHandler};

/// Serves the API straight from a [`ControlPlane`].
pub struct ControlPlaneAdapter {
    plane: Arc<ControlPlane>,
}

impl ControlPlaneAdapter {
    pub fn new(plane: Arc<ControlPlane>) -> Self {
        Self { plane }
    }
}

#[async_trait]
impl ApiHandler for ControlPlaneAdapter {
    async fn status(&self) -> Result<SupervisorStatus, ApiError> {
        Ok(self.plane.status())
    }

    async fn capabilities(&self) -> Result<serde_json::Value, ApiError> {
        self.plane.capabilities().map_err(ApiError::from)
    }

    async fn list_policies(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.plane.policies())
    }

    async fn create_policy(&self, name: String, policy: Policy) -> Result<PolicyView, ApiError> {
        let state = self.plane.create_policy(&name, policy.clone()).await?;
        Ok(PolicyView::new(policy, state))
    }

    async fn get_policy(&self, name: &str) -> Result<Option<PolicyView>, ApiError> {
        Ok(self.plane.policy(name))
    }

    async fn delete_policy(&self, name: &str, caller: &str) -> Result<(), ApiError> {
        self.plane.delete_policy(name, caller)?;
        Ok(())
    }
}
