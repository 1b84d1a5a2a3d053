//! Drives a whole build from plan to final status.

use std::path::Path;
use std::sync::Arc;

use conveyor_core::{BuildStatus, Plan};
use events::{BuildEvent, EventBus};
use exec::{RunState, StepContext};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vars::Variables;

use crate::builder::StepBuilder;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::factory::StepFactory;

/// What became of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub build_id: Uuid,
    pub status: BuildStatus,
    /// Number of times the step tree was run.
    pub attempts: u32,
    pub error: Option<String>,
}

pub struct BuildRunner {
    config: EngineConfig,
    factory: Arc<dyn StepFactory>,
    bus: EventBus,
}

impl BuildRunner {
    pub fn new(config: EngineConfig, factory: Arc<dyn StepFactory>, bus: EventBus) -> Self {
        Self {
            config,
            factory,
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run `plan` until it finishes, is aborted through `cancel`, or runs
    /// out of attempts.
    ///
    /// Errors only when the plan or the configuration is invalid; anything
    /// that goes wrong while running is reported in the outcome.
    pub async fn run(
        &self,
        plan: &Plan,
        credentials: Arc<dyn Variables>,
        cancel: CancellationToken,
    ) -> Result<BuildOutcome> {
        let build_id = Uuid::new_v4();
        let builder = StepBuilder::new(Arc::clone(&self.factory), self.bus.clone(), build_id)
            .with_retry_policy(Arc::new(self.config.retry_policy()?))
            .with_ensure_timeout(self.config.ensure_timeout()?);
        let mut step = builder.build(plan)?;

        let max_attempts = self.config.build_attempts();
        info!(build_id = %build_id, plan_id = %plan.id, max_attempts, "build started");
        self.bus.emit(
            build_id,
            BuildEvent::Status {
                status: BuildStatus::Started,
            },
        );

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            let state = RunState::new(Arc::clone(&credentials), self.config.enable_redaction);
            let ctx = StepContext::from_token(cancel.child_token());

            let result = step.run(&ctx, &state).await;
            ctx.cancel();

            match result {
                Err(err) if err.is_retriable() && attempts < max_attempts => {
                    warn!(build_id = %build_id, attempt = attempts, error = %err, "retrying build");
                    step = builder.build(plan)?;
                }
                other => break other,
            }
        };

        let (status, error) = match result {
            Ok(true) => (BuildStatus::Succeeded, None),
            Ok(false) => (BuildStatus::Failed, None),
            Err(err) if err.is_canceled() => (BuildStatus::Aborted, None),
            Err(err) => (BuildStatus::Errored, Some(err.to_string())),
        };

        match &error {
            Some(e) => warn!(build_id = %build_id, attempts, error = %e, "build errored"),
            None => info!(build_id = %build_id, attempts, status = ?status, "build finished"),
        }
        self.bus.emit(build_id, BuildEvent::Status { status });

        Ok(BuildOutcome {
            build_id,
            status,
            attempts,
            error,
        })
    }
}

/// Read a JSON plan from disk.
pub async fn load_plan(path: &Path) -> Result<Plan> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
