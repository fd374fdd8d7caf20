use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::error::{StepFailure, StepFailureCause};

use super::artifacts::{ArtifactDelta, ArtifactStore, ArtifactView};
use super::cancel::StopProbe;
use super::step::StepDefinition;

/// The work behind one step name.
///
/// Implementations call [`StepContext::should_stop`] at their own safe
/// points and return early when it is true. A step may substitute fallback
/// outputs itself; the runner never retries.
pub trait StepAction: Send + Sync {
    fn run(&self, ctx: &StepContext) -> Result<ArtifactDelta, StepFailureCause>;
}

impl<F> StepAction for F
where
    F: Fn(&StepContext) -> Result<ArtifactDelta, StepFailureCause> + Send + Sync,
{
    fn run(&self, ctx: &StepContext) -> Result<ArtifactDelta, StepFailureCause> {
        self(ctx)
    }
}

pub struct StepContext {
    job_id: String,
    step: String,
    working_folder: PathBuf,
    inputs: ArtifactView,
    stop: StopProbe,
}

impl StepContext {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    pub fn input(&self, key: &str) -> Result<&Path, StepFailureCause> {
        self.inputs.require(key)
    }

    pub fn inputs(&self) -> &ArtifactView {
        &self.inputs
    }

    pub fn should_stop(&self) -> bool {
        self.stop.should_stop()
    }
}

/// Runs registered actions for one job and polices their artifact contract.
pub struct StepRunner {
    job_id: String,
    working_folder: PathBuf,
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl StepRunner {
    pub fn new(job_id: impl Into<String>, working_folder: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job_id.into(),
            working_folder: working_folder.into(),
            actions: HashMap::new(),
        }
    }

    pub fn register(&mut self, step: impl Into<String>, action: impl StepAction + 'static) {
        self.actions.insert(step.into(), Arc::new(action));
    }

    pub fn with_action(mut self, step: impl Into<String>, action: impl StepAction + 'static) -> Self {
        self.register(step, action);
        self
    }

    pub fn has_action(&self, step: &str) -> bool {
        self.actions.contains_key(step)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    pub fn run(
        &self,
        step: &StepDefinition,
        artifacts: &ArtifactStore,
        stop: &StopProbe,
    ) -> Result<ArtifactDelta, StepFailure> {
        let _span = info_span!("step", job_id = %self.job_id, step = %step.name).entered();

        let action = self
            .actions
            .get(&step.name)
            .ok_or_else(|| StepFailure::new(&step.name, StepFailureCause::Unregistered))?;

        let inputs = artifacts
            .view(&step.inputs)
            .map_err(|key| StepFailure::new(&step.name, StepFailureCause::MissingInput(key)))?;

        let ctx = StepContext {
            job_id: self.job_id.clone(),
            step: step.name.clone(),
            working_folder: self.working_folder.clone(),
            inputs,
            stop: stop.clone(),
        };

        debug!("running");
        let delta = match panic::catch_unwind(AssertUnwindSafe(|| action.run(&ctx))) {
            Ok(result) => result.map_err(|cause| StepFailure::new(&step.name, cause))?,
            Err(_) => {
                warn!("step action panicked");
                return Err(StepFailure::new(&step.name, StepFailureCause::Panicked));
            }
        };

        if let Some(key) = delta.keys().find(|key| !step.declares_output(key)) {
            return Err(StepFailure::new(
                &step.name,
                StepFailureCause::UndeclaredOutput(key.to_string()),
            ));
        }
        if let Some(key) = step.outputs.iter().find(|key| delta.get(key).is_none()) {
            return Err(StepFailure::new(
                &step.name,
                StepFailureCause::MissingOutput(key.clone()),
            ));
        }

        debug!(artifacts = delta.len(), "finished");
        Ok(delta)
    }
}
