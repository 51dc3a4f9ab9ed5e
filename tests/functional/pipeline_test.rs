//! End-to-end tests of submission, the worker loop and the job store

mod common;

use std::sync::Arc;

use common::{params, start_app, wait_started, wait_terminal, Call, ScriptedEngine};
use gen_job_queue::engine::{EngineAdapter, Sampler};
use gen_job_queue::job::{JobId, JobStatus};
use gen_job_queue::config::DatabaseConfig;
use gen_job_queue::store::{JobStore, SqliteJobStore};
use gen_job_queue::{AppError, AppState};

#[tokio::test]
async fn test_submission_starts_pending() {
    let (engine, _probe, started, permits) = ScriptedEngine::gated(Sampler::Euler);
    let app = start_app(10, engine).await;

    let submission = app.state.submit(params("harbor at night", "Euler")).await.unwrap();
    let job = app.state.status(&submission.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.result.is_empty());
    assert!(job.completed_at.is_none());

    wait_started(&started).await;
    permits.send(()).unwrap();
    let done = wait_terminal(app.store.as_ref(), &submission.id).await;
    assert_eq!(done.status, JobStatus::Success);
    assert!(done.result.starts_with("/static/generate-"));
    assert!(done.result.ends_with(".png"));

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_queue_full_rejects_without_record() {
    let (engine, probe, started, permits) = ScriptedEngine::gated(Sampler::Euler);
    let app = start_app(10, engine).await;

    // Occupy the worker so nothing leaves the queue
    let blocker = app.state.submit(params("blocker", "Euler")).await.unwrap();
    assert_eq!(wait_started(&started).await, "blocker");

    let mut accepted = Vec::new();
    for i in 0..10 {
        let submission = app.state.submit(params(&format!("job {}", i), "Euler")).await.unwrap();
        assert!(submission.queued <= submission.capacity);
        accepted.push(submission.id);
    }
    assert_eq!(app.state.queue.len(), 10);

    let err = app.state.submit(params("one too many", "Euler")).await.unwrap_err();
    assert!(matches!(err, AppError::QueueFull { capacity: 10 }));
    assert_eq!(app.store.len(), 11);

    for id in &accepted {
        assert_eq!(app.state.status(id).await.unwrap().status, JobStatus::Pending);
    }

    for _ in 0..11 {
        permits.send(()).unwrap();
    }
    for id in std::iter::once(&blocker.id).chain(&accepted) {
        assert_eq!(wait_terminal(app.store.as_ref(), id).await.status, JobStatus::Success);
    }
    assert_eq!(probe.calls().len(), 11);
    assert!(!probe.calls().iter().any(|c| c.prompt == "one too many"));

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_jobs_complete_in_submission_order() {
    let (engine, probe) = ScriptedEngine::new(Sampler::Euler);
    let app = start_app(10, engine).await;

    let mut ids = Vec::new();
    for prompt in ["A", "B", "C"] {
        ids.push(app.state.submit(params(prompt, "Euler")).await.unwrap().id);
    }

    let mut completed = Vec::new();
    for id in &ids {
        let job = wait_terminal(app.store.as_ref(), id).await;
        completed.push(job.completed_at.unwrap());
    }
    assert!(completed.windows(2).all(|w| w[0] <= w[1]));

    let prompts: Vec<_> = probe.calls().into_iter().map(|c| c.prompt).collect();
    assert_eq!(prompts, vec!["A", "B", "C"]);

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_unknown_sampler_uses_default() {
    let (engine, probe) = ScriptedEngine::new(Sampler::DpmPp2mKarras);
    let app = start_app(10, engine).await;

    let id = app
        .state
        .submit(params("mountain lake", "totally-unknown-name"))
        .await
        .unwrap()
        .id;
    let job = wait_terminal(app.store.as_ref(), &id).await;

    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.parameters.sampler, "totally-unknown-name");
    assert_eq!(
        probe.calls(),
        vec![Call {
            prompt: "mountain lake".to_string(),
            sampler: Sampler::EulerAncestral,
        }]
    );
    // Restored after the job
    assert_eq!(probe.active(), Some(Sampler::DpmPp2mKarras));

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_engine_failure_is_contained() {
    let (engine, probe) = ScriptedEngine::new(Sampler::Euler);
    let app = start_app(10, engine).await;

    let failing = app.state.submit(params("please FAIL", "DPM++ 2M SDE")).await.unwrap().id;
    let panicking = app.state.submit(params("PANIC now", "Euler a")).await.unwrap().id;
    let healthy = app.state.submit(params("sunflower field", "Euler")).await.unwrap().id;

    let job = wait_terminal(app.store.as_ref(), &failing).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.starts_with("Failed to generate"));
    assert!(job.result.contains("CUDA out of memory"));

    let job = wait_terminal(app.store.as_ref(), &panicking).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.contains("scripted engine fault"));

    let job = wait_terminal(app.store.as_ref(), &healthy).await;
    assert_eq!(job.status, JobStatus::Success);

    assert_eq!(probe.active(), Some(Sampler::Euler));

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_worker_survives_panicking_release() {
    let (mut engine, probe) = ScriptedEngine::new(Sampler::Euler);
    engine.release_faults = 1;
    let app = start_app(10, engine).await;

    let first = app.state.submit(params("first", "DPM++ 2M Karras")).await.unwrap().id;
    let second = app.state.submit(params("second", "Euler a")).await.unwrap().id;

    let job = wait_terminal(app.store.as_ref(), &first).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.contains("device release fault"));

    let job = wait_terminal(app.store.as_ref(), &second).await;
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(probe.calls().len(), 2);
    assert_eq!(probe.active(), Some(Sampler::Euler));

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_invalid_dimensions_fail_the_job() {
    let (engine, probe) = ScriptedEngine::new(Sampler::Euler);
    let app = start_app(10, engine).await;

    let mut bad = params("odd size", "Euler");
    bad.height = 500;
    let id = app.state.submit(bad).await.unwrap().id;

    let job = wait_terminal(app.store.as_ref(), &id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.contains("divisible by 8"));
    assert!(probe.calls().is_empty());

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_artifact_written_to_output_dir() {
    let (engine, _probe) = ScriptedEngine::new(Sampler::Euler);
    let app = start_app(10, engine).await;

    let id = app.state.submit(params("teapot", "Euler")).await.unwrap().id;
    let job = wait_terminal(app.store.as_ref(), &id).await;

    let file_name = job.result.strip_prefix("/static/").unwrap();
    assert!(file_name.starts_with(&format!("generate-{}-", id)));
    let bytes = std::fs::read(app.dir.path().join("static").join(file_name)).unwrap();
    assert_eq!(bytes, common::PNG_BYTES);

    app.worker.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_queued_jobs_pending() {
    let (engine, _probe, started, permits) = ScriptedEngine::gated(Sampler::Euler);
    let app = start_app(10, engine).await;

    let running = app.state.submit(params("in flight", "Euler")).await.unwrap().id;
    wait_started(&started).await;
    let queued = app.state.submit(params("never started", "Euler")).await.unwrap().id;

    app.worker.stop();
    permits.send(()).unwrap();
    app.worker.shutdown().await;

    assert_eq!(app.store.get(&running).await.unwrap().status, JobStatus::Success);
    assert_eq!(app.store.get(&queued).await.unwrap().status, JobStatus::Pending);
    assert_eq!(app.store.count_pending().await.unwrap(), 1);
    assert_eq!(app.state.queue.stats().processed, 1);
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let database = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("db/jobs.sqlite3").display()),
        max_connections: 2,
    };

    let id: JobId = {
        let store = Arc::new(SqliteJobStore::connect(&database).await.unwrap());
        let (engine, _probe) = ScriptedEngine::new(Sampler::Euler);
        let (state, worker) = AppState::start(
            common::test_settings(4, &dir),
            store.clone(),
            EngineAdapter::new(engine),
        )
        .await
        .unwrap();

        let id = state.submit(params("durable", "Euler")).await.unwrap().id;
        assert_eq!(wait_terminal(store.as_ref(), &id).await.status, JobStatus::Success);
        worker.shutdown().await;
        store.pool().close().await;
        id
    };

    let reopened = SqliteJobStore::connect(&database).await.unwrap();
    let job = reopened.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.parameters.prompt, "durable");
    assert!(job.completed_at.is_some());
}
