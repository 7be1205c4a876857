//! # Bridge Builder
//!
//! Provides a fluent API for configuring a [`Bridge`] before it is created.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::bridge::Bridge;
use crate::engine::Engine;
use crate::error::Error;
use crate::error::Result;
use crate::router::HostRouter;
use crate::router::Router;

pub const DEFAULT_WORKER_THREADS: usize = 2;
pub const DEFAULT_THREAD_NAME: &str = "hostlink-worker";

/// Fluent builder for a [`Bridge`].
///
/// Without [`runtime`](Self::runtime) the bridge owns a multi-threaded tokio
/// runtime sized by [`worker_threads`](Self::worker_threads).
pub struct BridgeBuilder {
    engine: Arc<dyn Engine>,
    runtime: Option<Handle>,
    worker_threads: usize,
    thread_name: String,
    router: Option<Arc<dyn HostRouter>>,
}

impl BridgeBuilder {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            runtime: None,
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name: DEFAULT_THREAD_NAME.into(),
            router: None,
        }
    }

    /// Runs engine round trips on an existing runtime instead of an owned one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n.max(1);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Installs `router` before the bridge is handed out.
    pub fn router(mut self, router: Arc<dyn HostRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Result<Bridge> {
        let table = Arc::new(Router::new());
        if let Some(router) = self.router {
            table.set(router);
        }

        let (runtime, handle) = match self.runtime {
            Some(handle) => (None, handle),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(self.worker_threads)
                    .thread_name(&self.thread_name)
                    .enable_all()
                    .build()
                    .map_err(|e| Error::Runtime(e.to_string()))?;
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
        };

        tracing::debug!(
            owned_runtime = runtime.is_some(),
            workers = self.worker_threads,
            "bridge built"
        );
        Ok(Bridge::from_parts(self.engine, table, runtime, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    #[test]
    fn test_build_owned_runtime() {
        let bridge = BridgeBuilder::new(Arc::new(MockEngine::new()))
            .worker_threads(1)
            .thread_name("test-worker")
            .build()
            .unwrap();
        assert!(!bridge.router().is_configured());
    }

    #[test]
    fn test_build_with_router() {
        struct Nothing;
        impl HostRouter for Nothing {}

        let bridge = BridgeBuilder::new(Arc::new(MockEngine::new()))
            .router(Arc::new(Nothing))
            .build()
            .unwrap();
        assert!(bridge.router().is_configured());
    }

    #[tokio::test]
    async fn test_build_on_existing_runtime() {
        let bridge = BridgeBuilder::new(Arc::new(MockEngine::new()))
            .runtime(Handle::current())
            .build()
            .unwrap();
        drop(bridge);
    }
}
