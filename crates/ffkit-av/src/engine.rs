//! Shared tool and capability state.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::capabilities::CapabilityCache;
use crate::tools::{ToolCache, ToolPaths};

static GLOBAL: Lazy<Arc<Engine>> = Lazy::new(|| Arc::new(Engine::default()));

/// Resolved tool paths plus the capability cache of the engine they point
/// to.
///
/// Sessions share one process-wide engine unless they are given their own
/// through [`Session::with_engine`](crate::Session::with_engine).
#[derive(Debug, Default)]
pub struct Engine {
    tools: ToolCache,
    capabilities: CapabilityCache,
}

impl Engine {
    pub fn new(paths: ToolPaths) -> Self {
        Self {
            tools: ToolCache::new(paths),
            capabilities: CapabilityCache::default(),
        }
    }

    /// The process-wide engine.
    pub fn global() -> Arc<Engine> {
        GLOBAL.clone()
    }

    pub fn tools(&self) -> &ToolCache {
        &self.tools
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    /// Drop every cached tool path and capability listing.
    pub fn reset(&self) {
        self.tools.reset();
        self.capabilities.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_engine_is_shared() {
        assert!(Arc::ptr_eq(&Engine::global(), &Engine::global()));
    }
}
