//! External collaborators the engine calls into.
//!
//! ## Contents
//! - [`Transport`] delivers one payload into one channel
//! - [`Directory`] live server/channel lookup
//! - [`Discovery`] candidate servers and the automation that joins them
//! - [`LogSink`] persistence of delivery reports, plus [`TracingSink`]
//!
//! The engine owns none of these; they are handed to
//! [`EngineBuilder`](crate::EngineBuilder) (transport, directory, sink) or to an
//! [`AutoGroup`](crate::AutoGroup) (discovery).

mod directory;
mod discovery;
mod log;
mod transport;

pub use directory::{Channel, ChannelId, ChannelKind, Directory, Server, ServerId};
pub use discovery::{Candidate, Discovery};
pub use log::{AuthorContext, LogSink, ServerContext, SinkError, TracingSink};
pub use transport::{Session, Transport};
