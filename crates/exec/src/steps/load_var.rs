use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_core::{LoadVarPlan, PlanId};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::{BuildStepDelegateFactory, Step};

/// Reads a file from an artifact and binds its content as a local var.
pub struct LoadVarStep {
    plan_id: PlanId,
    plan: LoadVarPlan,
    delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    succeeded: AtomicBool,
}

impl LoadVarStep {
    pub fn new(
        plan_id: PlanId,
        plan: LoadVarPlan,
        delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    ) -> Self {
        Self {
            plan_id,
            plan,
            delegate_factory,
            succeeded: AtomicBool::new(false),
        }
    }

    async fn fetch(&self, state: &RunState) -> Result<Value> {
        let (artifact_name, path) = self
            .plan
            .file
            .split_once('/')
            .filter(|(name, path)| !name.is_empty() && !path.is_empty())
            .ok_or_else(|| ExecError::UnspecifiedArtifact(self.plan.file.clone()))?;

        let artifact = state
            .artifact_repository()
            .artifact_for(artifact_name)
            .ok_or_else(|| ExecError::ArtifactNotFound(artifact_name.to_string()))?;

        let content = artifact.read_file(path).await?;
        let format = self.format()?;
        parse_content(&content, &format).map_err(|message| ExecError::Parse {
            file: self.plan.file.clone(),
            format,
            message,
        })
    }

    fn format(&self) -> Result<String> {
        if let Some(format) = &self.plan.format {
            return match format.as_str() {
                "json" | "yml" | "yaml" | "trim" | "raw" => Ok(format.clone()),
                other => Err(ExecError::InvalidFormat(other.to_string())),
            };
        }

        let extension = Path::new(&self.plan.file)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Ok(match extension {
            "json" => "json",
            "yml" => "yml",
            "yaml" => "yaml",
            _ => "trim",
        }
        .to_string())
    }
}

fn parse_content(content: &[u8], format: &str) -> std::result::Result<Value, String> {
    match format {
        "json" => serde_json::from_slice(content).map_err(|e| e.to_string()),
        "yml" | "yaml" => serde_yaml::from_slice(content).map_err(|e| e.to_string()),
        "raw" => Ok(Value::String(String::from_utf8_lossy(content).into_owned())),
        _ => Ok(Value::String(
            String::from_utf8_lossy(content).trim().to_string(),
        )),
    }
}

#[async_trait]
impl Step for LoadVarStep {
    async fn run(&self, _ctx: &StepContext, state: &RunState) -> Result<bool> {
        let delegate = self.delegate_factory.build_step_delegate(state);
        delegate.initializing();
        let mut stdout = delegate.stdout();
        delegate.starting();

        let value = self.fetch(state).await?;
        if let Err(e) = writeln!(stdout, "var {} fetched.", self.plan.name) {
            warn!(error = %e, "failed to write step output");
        }

        state.add_local_var(self.plan.name.clone(), value, !self.plan.reveal);
        if let Err(e) = writeln!(stdout, "added var {} to build.", self.plan.name) {
            warn!(error = %e, "failed to write step output");
        }
        debug!(plan_id = %self.plan_id, var = %self.plan.name, "loaded var");

        delegate.finished(true);
        self.succeeded.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn succeeded(&self) -> bool {
        self.succeeded.load(Ordering::SeqCst)
    }
}
