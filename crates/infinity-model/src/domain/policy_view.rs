use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Policy, PolicyName, RunnerState};

/// A registered policy echoed back together with the live state of its runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyView {
    #[serde(flatten)]
    pub policy: Policy,
    #[serde(flatten)]
    pub state: RunnerState,
}

/// Response body for policy reads: `{ <name>: PolicyView }`.
pub type PolicyViewDocument = BTreeMap<PolicyName, PolicyView>;

impl PolicyView {
    pub fn new(policy: Policy, state: RunnerState) -> Self {
        Self { policy, state }
    }

    /// Wrap the view under its policy name, the shape clients submitted it in.
    pub fn into_document(self, name: impl Into<PolicyName>) -> PolicyViewDocument {
        BTreeMap::from([(name.into(), self)])
    }
}
