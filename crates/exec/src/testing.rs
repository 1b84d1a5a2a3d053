//! Fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::{BuildStepDelegate, BuildStepDelegateFactory, OutputWriter, Step};

#[derive(Clone)]
pub enum Outcome {
    Succeed,
    Fail,
    Error(String),
    Panic,
    /// Wait until the context ends and return its error.
    Block,
}

/// Counts how many fake steps run at the same time.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

pub struct FakeStep {
    outcome: Outcome,
    delay: Option<Duration>,
    concurrency: Option<Arc<Concurrency>>,
    runs: AtomicUsize,
    succeeded: AtomicBool,
    saw_ctx_err: AtomicBool,
    hooks: Mutex<Vec<Arc<dyn Step>>>,
}

impl FakeStep {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            delay: None,
            concurrency: None,
            runs: AtomicUsize::new(0),
            succeeded: AtomicBool::new(false),
            saw_ctx_err: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn succeed() -> Arc<Self> {
        Arc::new(Self::new(Outcome::Succeed))
    }

    pub fn fail() -> Arc<Self> {
        Arc::new(Self::new(Outcome::Fail))
    }

    pub fn error(message: &str) -> Arc<Self> {
        Arc::new(Self::new(Outcome::Error(message.to_string())))
    }

    pub fn panics() -> Arc<Self> {
        Arc::new(Self::new(Outcome::Panic))
    }

    pub fn blocks() -> Arc<Self> {
        Arc::new(Self::new(Outcome::Block))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_concurrency(mut self, concurrency: Arc<Concurrency>) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Whether the context was already ended when the step was run.
    pub fn saw_ctx_err(&self) -> bool {
        self.saw_ctx_err.load(Ordering::SeqCst)
    }

    pub fn hooks(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }
}

#[async_trait]
impl Step for FakeStep {
    async fn run(&self, ctx: &StepContext, _state: &RunState) -> Result<bool> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if ctx.err().is_some() {
            self.saw_ctx_err.store(true, Ordering::SeqCst);
        }

        if let Some(concurrency) = &self.concurrency {
            let now = concurrency.current.fetch_add(1, Ordering::SeqCst) + 1;
            concurrency.max.fetch_max(now, Ordering::SeqCst);
        }

        let result = self.finish(ctx).await;

        if let Some(concurrency) = &self.concurrency {
            concurrency.current.fetch_sub(1, Ordering::SeqCst);
        }

        if let Ok(ok) = &result {
            self.succeeded.store(*ok, Ordering::SeqCst);
        }
        result
    }

    fn succeeded(&self) -> bool {
        self.succeeded.load(Ordering::SeqCst)
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.hooks.lock().unwrap().push(hook);
    }
}

impl FakeStep {
    async fn finish(&self, ctx: &StepContext) -> Result<bool> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => return Err(ctx.err().unwrap_or(ExecError::Canceled)),
            }
        }

        match &self.outcome {
            Outcome::Succeed => Ok(true),
            Outcome::Fail => Ok(false),
            Outcome::Error(message) => Err(ExecError::Other(anyhow::anyhow!(message.clone()))),
            Outcome::Panic => panic!("fake step panicked"),
            Outcome::Block => {
                ctx.cancelled().await;
                Err(ctx.err().unwrap_or(ExecError::Canceled))
            }
        }
    }
}

/// Records everything reported through it.
#[derive(Default)]
pub struct FakeDelegate {
    pub errors: Mutex<Vec<String>>,
    pub events: Mutex<Vec<String>>,
    pub stdout: Arc<Mutex<Vec<u8>>>,
}

impl FakeDelegate {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8(self.stdout.lock().unwrap().clone()).unwrap()
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl BuildStepDelegate for FakeDelegate {
    fn initializing(&self) {
        self.events.lock().unwrap().push("initializing".into());
    }

    fn starting(&self) {
        self.events.lock().unwrap().push("starting".into());
    }

    fn finished(&self, succeeded: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finished:{}", succeeded));
    }

    fn errored(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn stdout(&self) -> OutputWriter {
        Box::new(SharedBuffer(Arc::clone(&self.stdout)))
    }

    fn stderr(&self) -> OutputWriter {
        Box::new(std::io::sink())
    }
}

/// Hands out the same delegate for every state.
#[derive(Default)]
pub struct FakeDelegateFactory {
    pub delegate: Arc<FakeDelegate>,
}

impl BuildStepDelegateFactory for FakeDelegateFactory {
    fn build_step_delegate(&self, _state: &RunState) -> Arc<dyn BuildStepDelegate> {
        self.delegate.clone()
    }
}

/// Reads the local var `name` from whatever state the step runs with.
pub struct CaptureVarStep {
    pub name: String,
    pub seen: Mutex<Vec<serde_json::Value>>,
}

impl CaptureVarStep {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<serde_json::Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Step for CaptureVarStep {
    async fn run(&self, _ctx: &StepContext, state: &RunState) -> Result<bool> {
        let reference = vars::Reference::new(self.name.clone()).with_source(vars::LOCAL_SOURCE);
        if let Some(value) = state.get(&reference)? {
            self.seen.lock().unwrap().push(value);
        }
        Ok(true)
    }

    fn succeeded(&self) -> bool {
        true
    }
}
