//! Dependency-aware execution of one job's step graph.
//!
//! One loop serves both concurrency modes. Sequential runs each ready step
//! inline on the calling thread; bounded-parallel hands every ready step to
//! a [`WorkerPool`] and blocks only while waiting for the next pool event.
//! Either way a step is dispatched only after all of its dependencies
//! reached `Succeeded`, and among ready steps the first declared goes first.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, error, info, info_span, warn};

use crate::error::{SchedulerError, StepFailure, WorkerError};
use crate::worker::pool::{PoolEvent, StepTask, WorkerPool};

use super::artifacts::{ArtifactDelta, ArtifactStore};
use super::cancel::{CancellationFlag, StopProbe};
use super::command::CommandChannel;
use super::graph::StepGraph;
use super::progress::ProgressReporter;
use super::runner::StepRunner;
use super::step::StepState;
use super::ConcurrencyMode;

/// How often a parallel run re-checks for cancellation while steps are busy.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Percent range a step's progress is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneBand {
    pub start: u8,
    pub end: u8,
}

impl MilestoneBand {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }
}

/// Hooks the coordinator uses to follow a run.
pub trait ExecutionObserver: Send + Sync {
    fn band(&self, _step: &str) -> Option<MilestoneBand> {
        None
    }

    fn step_started(&self, _step: &str) {}

    fn step_finished(&self, _step: &str, _state: StepState) {}
}

pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    /// Final state of every step, in declared order.
    pub step_states: Vec<(String, StepState)>,
    /// Step names in the order they actually started.
    pub dispatch_order: Vec<String>,
}

impl ExecutionReport {
    fn rejected(graph: &StepGraph, err: SchedulerError) -> Self {
        Self {
            outcome: ExecutionOutcome::Failed(err.to_string()),
            step_states: graph
                .steps()
                .iter()
                .map(|s| (s.name.clone(), StepState::Pending))
                .collect(),
            dispatch_order: Vec::new(),
        }
    }

    pub fn state_of(&self, step: &str) -> Option<StepState> {
        self.step_states
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, state)| *state)
    }

    pub fn started(&self, step: &str) -> bool {
        self.dispatch_order.iter().any(|name| name == step)
    }
}

struct RunState {
    states: Vec<StepState>,
    remaining: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
    dispatch_order: Vec<String>,
}

impl RunState {
    fn new(remaining: Vec<usize>, dependents: Vec<Vec<usize>>) -> Self {
        let ready = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| index)
            .collect();
        Self {
            states: vec![StepState::Pending; remaining.len()],
            remaining,
            dependents,
            ready,
            dispatch_order: Vec::new(),
        }
    }

    fn release_dependents(&mut self, index: usize) {
        for &dependent in &self.dependents[index] {
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 {
                self.ready.insert(dependent);
            }
        }
    }

    /// After a failure nothing else finishes: steps not yet done are cancelled.
    fn halt_unfinished(&mut self) {
        for state in self.states.iter_mut() {
            if !state.is_terminal() {
                *state = StepState::Cancelled;
            }
        }
    }

    fn all_succeeded(&self) -> bool {
        self.states.iter().all(|s| *s == StepState::Succeeded)
    }

    fn into_report(self, graph: &StepGraph, outcome: ExecutionOutcome) -> ExecutionReport {
        ExecutionReport {
            outcome,
            step_states: graph
                .steps()
                .iter()
                .map(|s| s.name.clone())
                .zip(self.states)
                .collect(),
            dispatch_order: self.dispatch_order,
        }
    }
}

pub struct DependencyScheduler {
    runner: Arc<StepRunner>,
    artifacts: Arc<ArtifactStore>,
    progress: ProgressReporter,
    cancel: CancellationFlag,
    commands: Option<Arc<CommandChannel>>,
    observer: Arc<dyn ExecutionObserver>,
}

impl DependencyScheduler {
    pub fn new(runner: Arc<StepRunner>, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            runner,
            artifacts,
            progress: ProgressReporter::new(),
            cancel: CancellationFlag::new(),
            commands: None,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// The job's cancellation flag; in-flight steps observe it.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drain cancel commands for this job at every checkpoint.
    pub fn with_commands(mut self, commands: Arc<CommandChannel>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn execute(&self, graph: &StepGraph, mode: ConcurrencyMode) -> ExecutionReport {
        let _span = info_span!(
            "schedule",
            job_id = %self.runner.job_id(),
            steps = graph.len(),
            mode = %mode
        )
        .entered();

        let (remaining, dependents) = match graph
            .validate()
            .and_then(|_| graph.dependency_tables())
        {
            Ok(tables) => tables,
            Err(e) => {
                error!(error = %e, "Rejected step graph");
                return ExecutionReport::rejected(graph, e);
            }
        };

        let mut run = RunState::new(remaining, dependents);
        let halt = CancellationFlag::new();
        let stop = StopProbe::new(self.cancel.clone(), halt.clone());

        let outcome = match mode {
            ConcurrencyMode::Sequential => self.run_sequential(graph, &mut run, &stop, &halt),
            ConcurrencyMode::BoundedParallel(_) => {
                self.run_parallel(graph, &mut run, &stop, &halt, mode.worker_count())
            }
        };

        match &outcome {
            ExecutionOutcome::Completed => info!("All steps succeeded"),
            ExecutionOutcome::Cancelled => info!("Run cancelled"),
            ExecutionOutcome::Failed(message) => error!(error = %message, "Run failed"),
        }

        run.into_report(graph, outcome)
    }

    fn cancel_requested(&self) -> bool {
        if let Some(commands) = &self.commands {
            if commands.take_cancel(self.runner.job_id()) {
                self.cancel.cancel();
            }
        }
        self.cancel.is_cancelled()
    }

    fn run_sequential(
        &self,
        graph: &StepGraph,
        run: &mut RunState,
        stop: &StopProbe,
        halt: &CancellationFlag,
    ) -> ExecutionOutcome {
        loop {
            if self.cancel_requested() {
                return ExecutionOutcome::Cancelled;
            }
            let Some(index) = run.ready.pop_first() else {
                break;
            };

            self.on_started(graph, run, index);
            let result = self.runner.run(&graph.steps()[index], &self.artifacts, stop);
            if let Some(failure) = self.on_finished(graph, run, index, result, stop) {
                halt.cancel();
                run.halt_unfinished();
                return ExecutionOutcome::Failed(failure.to_string());
            }
        }

        self.final_outcome(run)
    }

    fn run_parallel(
        &self,
        graph: &StepGraph,
        run: &mut RunState,
        stop: &StopProbe,
        halt: &CancellationFlag,
        worker_count: usize,
    ) -> ExecutionOutcome {
        let pool = match WorkerPool::new(
            worker_count,
            Arc::clone(&self.runner),
            Arc::clone(&self.artifacts),
            stop.clone(),
        ) {
            Ok(pool) => pool,
            Err(e) => return ExecutionOutcome::Failed(e.to_string()),
        };

        let mut in_flight = 0usize;
        let mut cancelled = false;

        loop {
            if !cancelled {
                cancelled = self.cancel_requested();
            }

            while !cancelled {
                let Some(index) = run.ready.pop_first() else {
                    break;
                };
                if self.cancel_requested() {
                    run.ready.insert(index);
                    cancelled = true;
                    break;
                }
                let task = StepTask {
                    index,
                    step: graph.steps()[index].clone(),
                };
                if let Err(e) = pool.submit(task) {
                    halt.cancel();
                    pool.detach();
                    return ExecutionOutcome::Failed(e.to_string());
                }
                debug!(step = %graph.steps()[index].name, "Submitted to pool");
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let event = match pool.recv_event_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    halt.cancel();
                    pool.detach();
                    return ExecutionOutcome::Failed(WorkerError::ChannelClosed.to_string());
                }
            };

            match event {
                PoolEvent::Started { index } => self.on_started(graph, run, index),
                PoolEvent::Skipped { index } => {
                    in_flight -= 1;
                    debug!(step = %graph.steps()[index].name, "Skipped after stop");
                }
                PoolEvent::Finished { index, result } => {
                    in_flight -= 1;
                    if let Some(failure) = self.on_finished(graph, run, index, result, stop) {
                        halt.cancel();
                        run.halt_unfinished();
                        pool.detach();
                        return ExecutionOutcome::Failed(failure.to_string());
                    }
                }
            }
        }

        pool.wait();

        if cancelled {
            ExecutionOutcome::Cancelled
        } else {
            self.final_outcome(run)
        }
    }

    fn final_outcome(&self, run: &RunState) -> ExecutionOutcome {
        if run.all_succeeded() {
            ExecutionOutcome::Completed
        } else {
            ExecutionOutcome::Failed("Some steps were never scheduled".to_string())
        }
    }

    fn on_started(&self, graph: &StepGraph, run: &mut RunState, index: usize) {
        let name = &graph.steps()[index].name;
        run.states[index] = StepState::Running;
        run.dispatch_order.push(name.clone());
        info!(step = %name, "Step started");

        self.observer.step_started(name);
        if let Some(band) = self.observer.band(name) {
            self.progress
                .publish(u32::from(band.start), format!("{} starting", name));
        }
    }

    /// Records a step's result. Returns the failure that must end the run.
    fn on_finished(
        &self,
        graph: &StepGraph,
        run: &mut RunState,
        index: usize,
        result: Result<ArtifactDelta, StepFailure>,
        stop: &StopProbe,
    ) -> Option<StepFailure> {
        let name = &graph.steps()[index].name;

        match result {
            Ok(delta) => {
                self.artifacts.merge(delta);
                run.states[index] = StepState::Succeeded;
                run.release_dependents(index);
                info!(step = %name, "Step succeeded");

                if let Some(band) = self.observer.band(name) {
                    self.progress
                        .publish(u32::from(band.end), format!("{} done", name));
                }
                self.observer.step_finished(name, StepState::Succeeded);
                None
            }
            Err(failure) if stop.is_cancelled() => {
                run.states[index] = StepState::Cancelled;
                warn!(step = %name, error = %failure, "Step stopped after cancellation");
                self.observer.step_finished(name, StepState::Cancelled);
                None
            }
            Err(failure) => {
                run.states[index] = StepState::Failed;
                error!(step = %name, error = %failure, "Step failed");
                self.observer.step_finished(name, StepState::Failed);
                Some(failure)
            }
        }
    }
}
