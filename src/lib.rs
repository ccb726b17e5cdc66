pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod hasher;
pub mod history;
pub mod media;
pub mod session;
pub mod timeline;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

pub use commands::{CommandOutcome, CommandRequest, CommandSpec, Engine, Preview};
pub use config::{EngineConfig, PunchThroughPolicy};
pub use error::EngineError;
pub use timeline::{Clip, FrameRate, LinkGroup, Rational, Sequence, Track, TrackKind};

/// Shared handle for hosts that drive the engine from several threads.
/// Commands are serialized by the lock; each runs to completion before the next.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<Engine>>,
}

impl EngineHandle {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(Engine::open(config)?))
    }

    pub fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock()
    }

    pub fn execute(&self, request: &CommandRequest) -> Result<CommandOutcome, EngineError> {
        self.inner.lock().execute(request)
    }

    pub fn preview(&self, request: &CommandRequest) -> Result<CommandOutcome, EngineError> {
        self.inner.lock().preview(request)
    }

    pub fn undo(&self) -> Result<CommandOutcome, EngineError> {
        self.inner.lock().undo()
    }

    pub fn redo(&self) -> Result<CommandOutcome, EngineError> {
        self.inner.lock().redo()
    }
}

/// Install the `env_logger` backend, defaulting to `info`. Safe to call twice.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already installed");
    }
}
