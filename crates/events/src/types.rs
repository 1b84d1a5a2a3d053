//! Event types emitted while a build runs

use chrono::{DateTime, Utc};
use conveyor_core::{BuildStatus, PlanId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Build the event belongs to
    pub build_id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: BuildEvent,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(build_id: Uuid, event: BuildEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            build_id,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Output stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSource::Stdout => "stdout",
            OutputSource::Stderr => "stderr",
        }
    }
}

/// The plan node an event was produced by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub id: PlanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<OutputSource>,
    /// Retry attempt numbers of the enclosing retry steps, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<u32>,
}

impl Origin {
    pub fn new(id: PlanId) -> Self {
        Self {
            id,
            source: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<u32>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_source(mut self, source: OutputSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// All events a build can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    /// The build as a whole changed status
    Status { status: BuildStatus },

    /// A step is preparing to run (fetching images, resolving inputs)
    Initialize { origin: Origin },

    /// A step started executing
    Start { origin: Origin },

    /// A step finished; `succeeded` is its own outcome
    Finish { origin: Origin, succeeded: bool },

    /// Output written by a step, after redaction
    Log { origin: Origin, payload: String },

    /// A step failed with an error
    Error { origin: Origin, message: String },
}

impl BuildEvent {
    /// Get the plan node associated with this event, if any
    pub fn plan_id(&self) -> Option<&PlanId> {
        match self {
            BuildEvent::Status { .. } => None,
            BuildEvent::Initialize { origin }
            | BuildEvent::Start { origin }
            | BuildEvent::Finish { origin, .. }
            | BuildEvent::Log { origin, .. }
            | BuildEvent::Error { origin, .. } => Some(&origin.id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BuildEvent::Status { .. } => "status",
            BuildEvent::Initialize { .. } => "initialize",
            BuildEvent::Start { .. } => "start",
            BuildEvent::Finish { .. } => "finish",
            BuildEvent::Log { .. } => "log",
            BuildEvent::Error { .. } => "error",
        }
    }
}
