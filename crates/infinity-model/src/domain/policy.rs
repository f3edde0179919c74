use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Unique key of a policy inside the registry.
pub type PolicyName = String;

/// Request body of a policy submission: exactly one top-level key (the policy
/// name) mapped to its [`Policy`].
pub type PolicyDocument = BTreeMap<PolicyName, Policy>;

/// A user-submitted declaration of one worker instance.
///
/// A policy is never mutated after it has been accepted; an update is a delete
/// followed by a create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Values joined into the worker's `--feature-gates` flag.
    #[serde(default)]
    pub feature_gates: Vec<String>,
    /// Overrides passed as `--set=key=value`.
    #[serde(default, deserialize_with = "scalar_map")]
    pub set: BTreeMap<String, String>,
    /// The worker's own configuration, forwarded untouched.
    #[serde(default)]
    pub config: serde_yaml::Mapping,
}

impl Policy {
    /// Policies without a worker configuration are rejected before anything is spawned.
    pub fn has_config(&self) -> bool {
        !self.config.is_empty()
    }
}

/// Accept `key: 1` or `key: true` as well as `key: "1"`; collectors read every override as text anyway.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "set.{key}: expected a scalar value, got {other:?}"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}
