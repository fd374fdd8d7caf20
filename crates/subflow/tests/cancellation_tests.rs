//! Cooperative cancellation of whole jobs.

mod common;

use std::sync::Arc;

use common::*;
use subflow::collaborators::LocalFileResolver;
use subflow::config::ConcurrencySetting;
use subflow::{JobSpec, Outcome};

fn spec(harness: &TestHarness) -> JobSpec {
    JobSpec::from_file(harness.write_video("video.mp4")).language("FR")
}

#[test]
fn cancel_before_first_step_runs_nothing() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    let collaborators = harness
        .collaborators()
        .with_resolver(Arc::new(GatedResolver::new(Arc::new(LocalFileResolver), gate.clone())));
    let coordinator = harness.coordinator(ConcurrencySetting::Parallel, collaborators);

    let handle = coordinator.submit(spec(&harness)).unwrap();
    gate.wait_entered();
    assert!(coordinator.cancel(&handle));
    gate.open();

    assert_eq!(handle.wait(), Outcome::Cancelled);
    assert!(harness.recorder.entries().is_empty());
    assert!(!harness.job_folder("video").exists());
}

#[test]
fn double_cancel_yields_one_cancelled_outcome() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    let collaborators = harness
        .collaborators()
        .with_resolver(Arc::new(GatedResolver::new(Arc::new(LocalFileResolver), gate.clone())));
    let coordinator = harness.coordinator(ConcurrencySetting::Sequential, collaborators);

    let handle = coordinator.submit(spec(&harness)).unwrap();
    gate.wait_entered();
    assert!(coordinator.cancel(&handle));
    assert!(!coordinator.cancel(&handle));
    gate.open();

    assert_eq!(handle.wait(), Outcome::Cancelled);
    let commands = coordinator.commands();
    assert_eq!(commands.outcome_of(handle.job_id()), Some(Outcome::Cancelled));
    assert_eq!(commands.try_recv_outcome().unwrap().outcome, Outcome::Cancelled);
    assert!(commands.try_recv_outcome().is_none());
}

fn cancel_after_extraction(concurrency: ConcurrencySetting) {
    let harness = TestHarness::new();
    let gate = Gate::new();
    let collaborators = harness
        .collaborators()
        .with_extractor(Arc::new(StubExtractor::gated(harness.recorder.clone(), gate.clone())));
    let coordinator = harness.coordinator(concurrency, collaborators);

    let handle = coordinator.submit(spec(&harness)).unwrap();
    gate.wait_entered();
    assert!(coordinator.cancel(&handle));
    gate.open();

    assert_eq!(handle.wait(), Outcome::Cancelled);
    assert_eq!(harness.recorder.started(), ["extract"]);
    assert!(harness.recorder.position("end:extract").is_some());
    // The finished step's artifact stays on disk.
    assert!(harness.job_folder("video").join("video.mp3").is_file());
    assert!(!harness.job_folder("video").join("FR_video_FR.srt").exists());
}

#[test]
fn cancel_between_steps_sequential() {
    cancel_after_extraction(ConcurrencySetting::Sequential);
}

#[test]
fn cancel_between_steps_parallel() {
    cancel_after_extraction(ConcurrencySetting::Parallel);
}

#[test]
fn cancel_after_completion_is_ignored() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator(ConcurrencySetting::Sequential, harness.collaborators());

    let handle = coordinator.submit(spec(&harness)).unwrap();
    let outcome = handle.wait();
    assert!(outcome.is_success());

    assert!(!coordinator.cancel(&handle));
    assert_eq!(coordinator.commands().outcome_of(handle.job_id()), Some(outcome));
}

#[test]
fn cancelling_one_job_leaves_another_running() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    let collaborators = harness
        .collaborators()
        .with_resolver(Arc::new(GatedResolver::new(Arc::new(LocalFileResolver), gate.clone())));
    let coordinator = harness.coordinator(ConcurrencySetting::Sequential, collaborators);

    let first = coordinator.submit(spec(&harness)).unwrap();
    gate.wait_entered();
    let second_video = harness.write_video("other.mp4");
    let second = coordinator
        .submit(JobSpec::from_file(second_video).language("FR"))
        .unwrap();
    gate.wait_entered();

    assert!(coordinator.cancel(&first));
    gate.open();
    gate.open();

    assert_eq!(first.wait(), Outcome::Cancelled);
    assert_eq!(second.wait(), Outcome::Succeeded(harness.job_folder("other")));
}
