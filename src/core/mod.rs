//! Runtime core: engine, configuration and lifecycle.
//!
//! The public API from this module is [`Engine`] (built through [`EngineBuilder`])
//! and its [`Config`].
//!
//! Internal modules:
//! - [`engine`]: group registry driven by bus events, close and shutdown;
//! - [`builder`]: wires collaborators into an engine;
//! - [`config`]: global settings and their defaults;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod engine;
mod shutdown;

pub use builder::EngineBuilder;
pub use config::{Config, OverlapPolicy};
pub(crate) use engine::EngineContext;
pub use engine::Engine;
