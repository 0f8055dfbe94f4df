use std::sync::Arc;

use crate::collab::{AuthorContext, Directory, LogSink, TracingSink, Transport};
use crate::core::Config;
use crate::core::engine::{Engine, EngineContext};
use crate::events::EventBus;
use crate::groups::scope::PatternRegistry;

/// Builder for constructing an [`Engine`] with optional collaborators.
pub struct EngineBuilder {
    cfg: Config,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    sink: Option<Arc<dyn LogSink>>,
    author: AuthorContext,
}

impl EngineBuilder {
    /// Creates a new builder with the required collaborators.
    pub fn new(cfg: Config, transport: Arc<dyn Transport>, directory: Arc<dyn Directory>) -> Self {
        Self {
            cfg,
            transport,
            directory,
            sink: None,
            author: AuthorContext::default(),
        }
    }

    /// Sets the sink delivery reports are saved to.
    ///
    /// Defaults to [`TracingSink`].
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Identifies the delivering account in saved reports.
    pub fn with_author(mut self, author: AuthorContext) -> Self {
        self.author = author;
        self
    }

    /// Builds the engine and spawns its bus worker.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Engine> {
        let ctx = EngineContext {
            bus: EventBus::new(),
            cfg: self.cfg,
            transport: self.transport,
            directory: self.directory,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink::new())),
            author: self.author,
            patterns: Arc::new(PatternRegistry::default()),
        };
        Engine::new_internal(ctx)
    }
}
