use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a node in a build plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A node of a compiled build plan.
///
/// Serialized as `{"id": "1", "do": [...]}`: the step kind is the single
/// key sitting next to `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    /// Retry attempt path of this node, e.g. `[2, 1]` for the first attempt
    /// of a retry nested inside the second attempt of another.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<u32>,
    #[serde(flatten)]
    pub step: PlanStep,
}

impl Plan {
    pub fn new(id: impl Into<PlanId>, step: PlanStep) -> Self {
        Self {
            id: id.into(),
            attempts: Vec::new(),
            step,
        }
    }
}

impl From<String> for PlanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    Do(Vec<Plan>),
    Aggregate(Vec<Plan>),
    InParallel(InParallelPlan),
    Across(AcrossPlan),
    OnSuccess(HookPlan),
    OnFailure(HookPlan),
    OnError(HookPlan),
    OnAbort(HookPlan),
    Ensure(HookPlan),
    Timeout(TimeoutPlan),
    Interrupt(TimeoutPlan),
    Try(TryPlan),
    Retry(Vec<Plan>),
    Get(GetPlan),
    Put(PutPlan),
    Task(TaskPlan),
    LoadVar(LoadVarPlan),
}

impl PlanStep {
    /// Short name of the step kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Do(_) => "do",
            Self::Aggregate(_) => "aggregate",
            Self::InParallel(_) => "in_parallel",
            Self::Across(_) => "across",
            Self::OnSuccess(_) => "on_success",
            Self::OnFailure(_) => "on_failure",
            Self::OnError(_) => "on_error",
            Self::OnAbort(_) => "on_abort",
            Self::Ensure(_) => "ensure",
            Self::Timeout(_) => "timeout",
            Self::Interrupt(_) => "interrupt",
            Self::Try(_) => "try",
            Self::Retry(_) => "retry",
            Self::Get(_) => "get",
            Self::Put(_) => "put",
            Self::Task(_) => "task",
            Self::LoadVar(_) => "load_var",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InParallelPlan {
    pub steps: Vec<Plan>,
    /// Maximum number of steps running at once; `0` means unbounded.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcrossPlan {
    pub vars: Vec<AcrossVar>,
    /// One entry per combination of values, in row-major order of `vars`.
    pub steps: Vec<AcrossStepPlan>,
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcrossVar {
    pub var: String,
    pub values: Vec<Value>,
    #[serde(default)]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcrossStepPlan {
    pub values: Vec<Value>,
    pub step: Plan,
}

/// A step paired with a hook that runs depending on its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookPlan {
    pub step: Box<Plan>,
    pub next: Box<Plan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutPlan {
    pub step: Box<Plan>,
    /// Duration string such as `"10m"`.
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryPlan {
    pub step: Box<Plan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    /// Plan whose stored result provides the version to fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_from: Option<PlanId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutPlan {
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub name: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadVarPlan {
    pub name: String,
    /// `<artifact>/<path inside artifact>`.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub reveal: bool,
}
