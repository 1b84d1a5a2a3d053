//! Step delegates that turn step activity into build events.

use std::io::{self, Write};
use std::sync::Arc;

use conveyor_core::PlanId;
use events::{BuildEvent, EventBus, Origin, OutputSource};
use exec::{
    BuildStepDelegate, BuildStepDelegateFactory, BuildVariables, OutputWriter, RedactingWriter,
    RunState,
};
use tracing::debug;
use uuid::Uuid;

/// Publishes every write as a log event.
struct EventWriter {
    bus: EventBus,
    build_id: Uuid,
    origin: Origin,
}

impl Write for EventWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.bus.emit(
            self.build_id,
            BuildEvent::Log {
                origin: self.origin.clone(),
                payload: String::from_utf8_lossy(buf).into_owned(),
            },
        );
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Delegate for one step of one build.
pub struct EventDelegate {
    bus: EventBus,
    build_id: Uuid,
    plan_id: PlanId,
    attempts: Vec<u32>,
    vars: BuildVariables,
    redact: bool,
}

impl EventDelegate {
    fn emit(&self, event: BuildEvent) {
        self.bus.emit(self.build_id, event);
    }

    fn origin(&self) -> Origin {
        Origin::new(self.plan_id.clone()).with_attempts(self.attempts.clone())
    }

    fn writer(&self, source: OutputSource) -> OutputWriter {
        let writer = EventWriter {
            bus: self.bus.clone(),
            build_id: self.build_id,
            origin: self.origin().with_source(source),
        };
        if self.redact {
            Box::new(RedactingWriter::new(writer, self.vars.clone()))
        } else {
            Box::new(writer)
        }
    }
}

impl BuildStepDelegate for EventDelegate {
    fn initializing(&self) {
        self.emit(BuildEvent::Initialize {
            origin: self.origin(),
        });
    }

    fn starting(&self) {
        self.emit(BuildEvent::Start {
            origin: self.origin(),
        });
    }

    fn finished(&self, succeeded: bool) {
        debug!(plan_id = %self.plan_id, succeeded, "step finished");
        self.emit(BuildEvent::Finish {
            origin: self.origin(),
            succeeded,
        });
    }

    fn errored(&self, message: &str) {
        self.emit(BuildEvent::Error {
            origin: self.origin(),
            message: message.to_string(),
        });
    }

    fn stdout(&self) -> OutputWriter {
        self.writer(OutputSource::Stdout)
    }

    fn stderr(&self) -> OutputWriter {
        self.writer(OutputSource::Stderr)
    }
}

/// Hands out [`EventDelegate`]s for one plan node.
#[derive(Clone)]
pub struct EventDelegateFactory {
    bus: EventBus,
    build_id: Uuid,
    plan_id: PlanId,
    attempts: Vec<u32>,
}

impl EventDelegateFactory {
    pub fn new(bus: EventBus, build_id: Uuid, plan_id: PlanId) -> Self {
        Self {
            bus,
            build_id,
            plan_id,
            attempts: Vec::new(),
        }
    }

    /// Tag every event with the retry attempts the node runs under.
    pub fn with_attempts(mut self, attempts: Vec<u32>) -> Self {
        self.attempts = attempts;
        self
    }
}

impl BuildStepDelegateFactory for EventDelegateFactory {
    fn build_step_delegate(&self, state: &RunState) -> Arc<dyn BuildStepDelegate> {
        Arc::new(EventDelegate {
            bus: self.bus.clone(),
            build_id: self.build_id,
            plan_id: self.plan_id.clone(),
            attempts: self.attempts.clone(),
            vars: state.vars().clone(),
            redact: state.redaction_enabled(),
        })
    }
}
