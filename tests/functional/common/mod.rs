//! Shared fixtures: a scriptable engine and app bootstrap

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gen_job_queue::config::Settings;
use gen_job_queue::engine::{Artifact, Engine, EngineAdapter, EngineError, Sampler};
use gen_job_queue::job::{Job, JobId, JobParameters};
use gen_job_queue::queue::WorkerHandle;
use gen_job_queue::store::{JobStore, MemoryJobStore};
use gen_job_queue::AppState;
use tempfile::TempDir;

pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// One generation as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub prompt: String,
    pub sampler: Sampler,
}

/// Observable state shared between a test and its engine
#[derive(Clone, Default)]
pub struct EngineProbe {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub active: Arc<Mutex<Option<Sampler>>>,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn active(&self) -> Option<Sampler> {
        *self.active.lock().unwrap()
    }
}

/// Engine double.
///
/// Prompts containing `FAIL` return an error, `PANIC` panics. With a gate
/// installed, every generation reports its prompt on `started` and waits
/// for one permit before finishing. `release_faults` makes that many
/// memory releases panic.
pub struct ScriptedEngine {
    probe: EngineProbe,
    gate: Option<(mpsc::Sender<String>, mpsc::Receiver<()>)>,
    pub release_faults: usize,
}

impl ScriptedEngine {
    pub fn new(initial: Sampler) -> (Self, EngineProbe) {
        let probe = EngineProbe::default();
        *probe.active.lock().unwrap() = Some(initial);
        (
            Self {
                probe: probe.clone(),
                gate: None,
                release_faults: 0,
            },
            probe,
        )
    }

    /// Returns (started prompts, permit sender)
    pub fn gated(initial: Sampler) -> (Self, EngineProbe, mpsc::Receiver<String>, mpsc::Sender<()>) {
        let (mut engine, probe) = Self::new(initial);
        let (started_tx, started_rx) = mpsc::channel();
        let (permit_tx, permit_rx) = mpsc::channel();
        engine.gate = Some((started_tx, permit_rx));
        (engine, probe, started_rx, permit_tx)
    }
}

impl Engine for ScriptedEngine {
    fn sampler(&self) -> Sampler {
        self.probe.active().unwrap_or_default()
    }

    fn set_sampler(&mut self, sampler: Sampler) {
        *self.probe.active.lock().unwrap() = Some(sampler);
    }

    fn generate(&mut self, params: &JobParameters) -> Result<Artifact, EngineError> {
        self.probe.calls.lock().unwrap().push(Call {
            prompt: params.prompt.clone(),
            sampler: self.sampler(),
        });

        if let Some((started, permits)) = &self.gate {
            let _ = started.send(params.prompt.clone());
            let _ = permits.recv();
        }

        if params.prompt.contains("PANIC") {
            panic!("scripted engine fault");
        }
        if params.prompt.contains("FAIL") {
            return Err(EngineError::Backend("CUDA out of memory".to_string()));
        }

        Ok(Artifact {
            data: PNG_BYTES.to_vec(),
            format: "png",
        })
    }

    fn release_memory(&mut self) {
        if self.release_faults > 0 {
            self.release_faults -= 1;
            panic!("device release fault");
        }
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub worker: WorkerHandle,
    pub store: Arc<MemoryJobStore>,
    pub dir: TempDir,
}

pub fn test_settings(capacity: usize, dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.queue.capacity = capacity;
    settings.storage.output_dir = dir.path().join("static").to_string_lossy().into_owned();
    settings.storage.url_prefix = "/static".to_string();
    settings
}

pub async fn start_app(capacity: usize, engine: ScriptedEngine) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryJobStore::new());
    let (state, worker) = AppState::start(
        test_settings(capacity, &dir),
        store.clone(),
        EngineAdapter::new(engine),
    )
    .await
    .unwrap();

    TestApp {
        state,
        worker,
        store,
        dir,
    }
}

pub fn params(prompt: &str, sampler: &str) -> JobParameters {
    JobParameters {
        prompt: prompt.to_string(),
        negative_prompt: "lowres".to_string(),
        width: 512,
        height: 512,
        guidance_scale: 7.0,
        steps: 20,
        sampler: sampler.to_string(),
    }
}

/// Wait until the engine reports it started a generation
pub async fn wait_started(started: &mpsc::Receiver<String>) -> String {
    for _ in 0..500 {
        if let Ok(prompt) = started.try_recv() {
            return prompt;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine never started");
}

/// Poll the store until the job leaves `pending`
pub async fn wait_terminal(store: &dyn JobStore, id: &JobId) -> Job {
    for _ in 0..500 {
        let job = store.get(id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", id);
}
