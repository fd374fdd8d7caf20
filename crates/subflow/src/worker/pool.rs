use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::{StepFailure, WorkerError};
use crate::pipeline::artifacts::{ArtifactDelta, ArtifactStore};
use crate::pipeline::cancel::StopProbe;
use crate::pipeline::runner::StepRunner;
use crate::pipeline::step::StepDefinition;

/// A step handed to the pool, identified by its position in the graph.
#[derive(Debug, Clone)]
pub struct StepTask {
    pub index: usize,
    pub step: StepDefinition,
}

/// What workers report back to the scheduler thread.
#[derive(Debug)]
pub enum PoolEvent {
    Started {
        index: usize,
    },
    Finished {
        index: usize,
        result: Result<ArtifactDelta, StepFailure>,
    },
    /// Dequeued after the run was told to stop; never started.
    Skipped {
        index: usize,
    },
}

/// Fixed set of named threads running steps of one job.
///
/// Results flow through an unbounded channel so a worker never blocks on
/// reporting while the scheduler is blocked on `submit`.
pub struct WorkerPool {
    task_sender: Sender<StepTask>,
    event_receiver: Receiver<PoolEvent>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads (at least one).
    pub fn new(
        worker_count: usize,
        runner: Arc<StepRunner>,
        artifacts: Arc<ArtifactStore>,
        stop: StopProbe,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (task_sender, task_receiver) = bounded::<StepTask>(worker_count * 2);
        let (event_sender, event_receiver) = unbounded::<PoolEvent>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let event_tx = event_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_runner = Arc::clone(&runner);
            let worker_artifacts = Arc::clone(&artifacts);
            let worker_stop = stop.clone();

            let handle = thread::Builder::new()
                .name(format!("subflow-step-{}-{}", runner.job_id(), worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        task_rx,
                        event_tx,
                        shutdown_flag,
                        worker_runner,
                        worker_artifacts,
                        worker_stop,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} step workers for job {}", worker_count, runner.job_id());

        Ok(Self {
            task_sender,
            event_receiver,
            workers,
            shutdown,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, task: StepTask) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.task_sender
            .send(task)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<PoolEvent, RecvTimeoutError> {
        self.event_receiver.recv_timeout(timeout)
    }

    pub fn try_recv_event(&self) -> Option<PoolEvent> {
        self.event_receiver.try_recv().ok()
    }

    pub fn shutdown(&self) {
        debug!("Shutting down step worker pool");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker.
    pub fn wait(self) {
        drop(self.task_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Step worker {} panicked: {:?}", i, e);
            } else {
                debug!("Step worker {} finished", i);
            }
        }
    }

    /// Closes the queue without joining. Workers exit after their current
    /// step, which may outlive this call.
    pub fn detach(self) {
        self.shutdown();
        drop(self.task_sender);
        debug!("Detached {} step workers", self.workers.len());
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<StepTask>,
    event_sender: Sender<PoolEvent>,
    shutdown: Arc<AtomicBool>,
    runner: Arc<StepRunner>,
    artifacts: Arc<ArtifactStore>,
    stop: StopProbe,
) {
    debug!("Step worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Step worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                let event = if stop.should_stop() {
                    debug!("Step worker {} skipping {}", worker_id, task.step.name);
                    PoolEvent::Skipped { index: task.index }
                } else {
                    if event_sender
                        .send(PoolEvent::Started { index: task.index })
                        .is_err()
                    {
                        break;
                    }
                    debug!("Step worker {} running {}", worker_id, task.step.name);
                    PoolEvent::Finished {
                        index: task.index,
                        result: runner.run(&task.step, &artifacts, &stop),
                    }
                };

                if let Err(e) = event_sender.send(event) {
                    debug!("Step worker {} has no listener: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Step worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Step worker {} stopped", worker_id);
}
