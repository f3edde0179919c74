use std::{
    io::Write,
    path::{Path, PathBuf},
};

use infinity_model::Policy;

use crate::error::ExecError;

/// Override that keeps workers from binding their own metrics port.
pub const SELF_TELEMETRY_OFF: &str = "--set=service.telemetry.metrics.level=None";

/// Command line derived from a policy, with its config already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    pub config_file: PathBuf,
    /// Comma-joined `feature_gates`, `None` when the policy has none.
    pub feature_gates: Option<String>,
    /// One `--set=key=value` per override, sorted by key.
    pub sets: Vec<String>,
}

impl WorkerArgs {
    /// Write the policy's worker config into `dir` and derive the flags.
    ///
    /// The file name starts with `policy_name`; uniqueness comes from the temp
    /// file allocator, so two policies never share a file.
    pub fn materialize(policy_name: &str, dir: &Path, policy: &Policy) -> Result<Self, ExecError> {
        let body = serde_yaml::to_string(&policy.config)
            .map_err(|e| ExecError::Config(format!("encode config of {policy_name}: {e}")))?;

        let create_err = |e: std::io::Error| {
            ExecError::Config(format!(
                "write config of {policy_name} into {}: {e}",
                dir.display()
            ))
        };
        let mut file = tempfile::Builder::new()
            .prefix(policy_name)
            .suffix(".yaml")
            .tempfile_in(dir)
            .map_err(create_err)?;
        file.write_all(body.as_bytes()).map_err(create_err)?;
        let (_, config_file) = file.keep().map_err(|e| create_err(e.error))?;

        let feature_gates =
            (!policy.feature_gates.is_empty()).then(|| policy.feature_gates.join(","));
        let sets = policy
            .set
            .iter()
            .map(|(key, value)| format!("--set={key}={value}"))
            .collect();

        Ok(Self {
            config_file,
            feature_gates,
            sets,
        })
    }

    /// Full worker argv.
    pub fn to_args(&self, self_telemetry: bool) -> Vec<String> {
        let mut args = vec![
            "--config".to_string(),
            self.config_file.display().to_string(),
        ];
        if !self_telemetry {
            args.push(SELF_TELEMETRY_OFF.to_string());
        }
        if let Some(gates) = &self.feature_gates {
            args.push("--feature-gates".to_string());
            args.push(gates.clone());
        }
        args.extend(self.sets.iter().cloned());
        args
    }
}
