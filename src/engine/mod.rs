//! Engine adapter - wraps the exclusive, stateful generation engine
//!
//! The engine is a blocking resource with one mutable piece of configuration,
//! the active sampler. [`EngineAdapter::run`] installs the sampler a job asks
//! for, runs the job, and puts the previous sampler back on every exit path.

pub mod http_engine;
pub mod sampler;

pub use http_engine::HttpEngine;
pub use sampler::{Sampler, SchedulerConfig, SchedulerKind};

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::debug;

use crate::job::JobParameters;

/// Failure raised while running a job on the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("engine backend failed: {0}")]
    Backend(String),

    #[error("could not decode engine output: {0}")]
    Decode(String),

    #[error("engine panicked: {0}")]
    Panicked(String),
}

/// Encoded media produced by one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub data: Vec<u8>,
    /// File extension matching `data` (e.g. `png`)
    pub format: &'static str,
}

/// The exclusive compute resource.
///
/// Calls are synchronous and may block for a long time; callers run them
/// off the async executor.
pub trait Engine: Send + 'static {
    /// Sampler currently installed
    fn sampler(&self) -> Sampler;

    /// Install a sampler for subsequent generations
    fn set_sampler(&mut self, sampler: Sampler);

    /// Run one generation with the installed sampler
    fn generate(&mut self, params: &JobParameters) -> Result<Artifact, EngineError>;

    /// Drop transient device memory held after a generation
    fn release_memory(&mut self) {}
}

/// Sampler installed for the lifetime of the scope; the previous one is
/// restored and device memory released when the scope drops.
struct SamplerScope<'a, E: Engine> {
    engine: &'a mut E,
    previous: Sampler,
}

impl<'a, E: Engine> SamplerScope<'a, E> {
    fn install(engine: &'a mut E, sampler: Sampler) -> Self {
        let previous = engine.sampler();
        engine.set_sampler(sampler);
        Self { engine, previous }
    }
}

impl<E: Engine> Deref for SamplerScope<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: Engine> DerefMut for SamplerScope<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: Engine> Drop for SamplerScope<'_, E> {
    fn drop(&mut self) {
        self.engine.set_sampler(self.previous);
        self.engine.release_memory();
    }
}

/// Owns the engine and runs jobs on it one at a time.
///
/// Only the worker loop holds an adapter, so no locking happens here.
pub struct EngineAdapter<E: Engine> {
    engine: E,
    fallback: Sampler,
}

impl<E: Engine> EngineAdapter<E> {
    /// Create an adapter that maps unknown sampler names to [`Sampler::DEFAULT`]
    pub fn new(engine: E) -> Self {
        Self::with_fallback(engine, Sampler::DEFAULT)
    }

    pub fn with_fallback(engine: E, fallback: Sampler) -> Self {
        Self { engine, fallback }
    }

    /// Name to sampler, never failing
    pub fn resolve_sampler(&self, name: &str) -> Sampler {
        Sampler::resolve(name, self.fallback)
    }

    /// Run one job synchronously
    pub fn run(&mut self, params: &JobParameters) -> Result<Artifact, EngineError> {
        let sampler = self.resolve_sampler(&params.sampler);
        if sampler.name() != params.sampler {
            debug!(requested = %params.sampler, sampler = %sampler, "Unknown sampler, using fallback");
        }

        // A panic while installing or restoring must not cost the adapter its engine
        let engine = &mut self.engine;
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            let mut scope = SamplerScope::install(engine, sampler);
            let generated = panic::catch_unwind(AssertUnwindSafe(|| {
                validate(params)?;
                scope.generate(params)
            }));
            drop(scope);
            generated
        }));

        outcome
            .and_then(|generated| generated)
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload))))
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

fn validate(params: &JobParameters) -> Result<(), EngineError> {
    if params.width == 0 || params.height == 0 {
        return Err(EngineError::InvalidParameters(format!(
            "dimensions must be positive, got {}x{}",
            params.width, params.height
        )));
    }
    if params.width % 8 != 0 || params.height % 8 != 0 {
        return Err(EngineError::InvalidParameters(format!(
            "width and height have to be divisible by 8 but are {} and {}",
            params.width, params.height
        )));
    }
    if params.steps == 0 {
        return Err(EngineError::InvalidParameters(
            "steps must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
