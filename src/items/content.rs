//! # Item content.
//!
//! An item delivers a [`Payload`] produced by its [`ContentSource`]. A source is either
//! a static payload or a producer function called once per send. A producer returning
//! `None` means "nothing to send this cycle": the item skips the cycle, its lifetime is
//! not charged, and it re-arms as usual.

use std::fmt;
use std::sync::Arc;

use crate::collab::ChannelKind;

/// Default audio volume (percent).
pub const DEFAULT_VOLUME: u8 = 50;

/// Audio clip played into a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    url: String,
    volume: u8,
}

impl Audio {
    /// Creates a clip; `volume` is clamped to `0..=100`.
    pub fn new(url: impl Into<String>, volume: u32) -> Self {
        Self {
            url: url.into(),
            volume: volume.min(100) as u8,
        }
    }

    /// Location of the audio stream or file.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Playback volume in percent.
    pub fn volume(&self) -> u8 {
        self.volume
    }
}

/// What gets delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text message.
    Text(String),
    /// Audio clip.
    Audio(Audio),
}

impl Payload {
    /// Channel kind this payload can be delivered to.
    pub fn kind(&self) -> ChannelKind {
        match self {
            Payload::Text(_) => ChannelKind::Text,
            Payload::Audio(_) => ChannelKind::Voice,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Audio> for Payload {
    fn from(a: Audio) -> Self {
        Payload::Audio(a)
    }
}

/// Producer called once per send.
pub type Producer = Arc<dyn Fn() -> Option<Payload> + Send + Sync>;

/// Where an item's payload comes from.
#[derive(Clone)]
pub enum ContentSource {
    /// Same payload every time.
    Static(Payload),
    /// Computed on every send; `None` skips the cycle.
    Producer(Producer),
}

impl ContentSource {
    /// Wraps a producer function.
    ///
    /// # Example
    /// ```
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use relaycast::{ContentSource, Payload};
    ///
    /// let n = AtomicU32::new(0);
    /// let src = ContentSource::producer(move || {
    ///     let i = n.fetch_add(1, Ordering::Relaxed);
    ///     (i % 2 == 0).then(|| Payload::Text(format!("tick {i}")))
    /// });
    /// assert_eq!(src.produce(), Some(Payload::Text("tick 0".into())));
    /// assert_eq!(src.produce(), None);
    /// ```
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> Option<Payload> + Send + Sync + 'static,
    {
        ContentSource::Producer(Arc::new(f))
    }

    /// Returns the payload for this cycle.
    pub fn produce(&self) -> Option<Payload> {
        match self {
            ContentSource::Static(p) => Some(p.clone()),
            ContentSource::Producer(f) => f(),
        }
    }
}

impl From<Payload> for ContentSource {
    fn from(p: Payload) -> Self {
        ContentSource::Static(p)
    }
}

impl From<&str> for ContentSource {
    fn from(s: &str) -> Self {
        ContentSource::Static(Payload::from(s))
    }
}

impl From<String> for ContentSource {
    fn from(s: String) -> Self {
        ContentSource::Static(Payload::Text(s))
    }
}

impl From<Audio> for ContentSource {
    fn from(a: Audio) -> Self {
        ContentSource::Static(Payload::Audio(a))
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Static(p) => f.debug_tuple("Static").field(p).finish(),
            ContentSource::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}
