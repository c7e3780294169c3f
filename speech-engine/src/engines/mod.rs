//! Speech engine implementations

mod command;
mod http;
#[cfg(feature = "kokoro")]
mod kokoro;
pub mod mock;

pub use command::CommandEngine;
pub use http::HttpEngine;
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroEngine;
pub use mock::MockEngine;

use std::sync::Arc;

use crate::config::{BackendKind, EngineConfig};
use crate::engine::SynthesisEngine;
use crate::error::Result;

/// Create an engine instance from configuration
pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn SynthesisEngine>> {
    log::debug!("Creating {} speech engine", config.backend);

    match config.backend {
        BackendKind::Http => Ok(Arc::new(HttpEngine::new(config)?)),
        BackendKind::Command => Ok(Arc::new(CommandEngine::new(config)?)),
        BackendKind::Kokoro => kokoro_engine(config),
    }
}

#[cfg(feature = "kokoro")]
fn kokoro_engine(config: &EngineConfig) -> Result<Arc<dyn SynthesisEngine>> {
    Ok(Arc::new(KokoroEngine::new(config)?))
}

#[cfg(not(feature = "kokoro"))]
fn kokoro_engine(_config: &EngineConfig) -> Result<Arc<dyn SynthesisEngine>> {
    Err(crate::error::EngineError::Unavailable(
        "this build has no embedded Kokoro support; rebuild with `--features kokoro`".into(),
    ))
}
