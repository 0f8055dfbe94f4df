//! # Item specification and update parameters.
//!
//! [`ItemSpec`] is the configuration an item is initialized from. [`ItemUpdate`] lists
//! the fields to change on a live item; anything left `None` keeps its current value.

use std::time::Duration;

use crate::collab::ChannelKind;
use crate::items::{Audio, ContentSource, Destinations};
use crate::policies::{Period, RemoveAfter};

/// Configuration of a sendable item.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use relaycast::{ChannelId, Destinations, ItemSpec, Period, RemoveAfter};
///
/// let spec = ItemSpec::text(
///     "hello",
///     Period::new(Some(Duration::from_secs(5)), Duration::from_secs(10)).unwrap(),
///     Destinations::fixed([ChannelId(1), ChannelId(2)]),
/// )
/// .with_remove_after(RemoveAfter::Sends(3))
/// .with_start_in(Duration::from_secs(1));
///
/// assert_eq!(spec.start_in(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ItemSpec {
    kind: ChannelKind,
    content: ContentSource,
    period: Period,
    destinations: Destinations,
    remove_after: Option<RemoveAfter>,
    start_in: Duration,
}

impl ItemSpec {
    /// Creates a spec with explicit parameters.
    ///
    /// ### Parameters
    /// - `kind`: channel kind the item delivers to
    /// - `content`: static payload or producer
    /// - `period`: delay between sends
    /// - `destinations`: fixed list or channel name pattern
    pub fn new(
        kind: ChannelKind,
        content: ContentSource,
        period: Period,
        destinations: Destinations,
    ) -> Self {
        Self {
            kind,
            content,
            period,
            destinations,
            remove_after: None,
            start_in: Duration::ZERO,
        }
    }

    /// Text item.
    pub fn text(
        content: impl Into<ContentSource>,
        period: Period,
        destinations: Destinations,
    ) -> Self {
        Self::new(ChannelKind::Text, content.into(), period, destinations)
    }

    /// Voice item playing `audio`.
    pub fn voice(audio: Audio, period: Period, destinations: Destinations) -> Self {
        Self::new(ChannelKind::Voice, audio.into(), period, destinations)
    }

    /// Returns a new spec with an automatic removal rule.
    pub fn with_remove_after(mut self, remove_after: RemoveAfter) -> Self {
        self.remove_after = Some(remove_after);
        self
    }

    /// Returns a new spec with a delay before the first send.
    pub fn with_start_in(mut self, start_in: Duration) -> Self {
        self.start_in = start_in;
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn content(&self) -> &ContentSource {
        &self.content
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    pub fn remove_after(&self) -> Option<RemoveAfter> {
        self.remove_after
    }

    pub fn start_in(&self) -> Duration {
        self.start_in
    }

    /// Applies `update` on top of `self`.
    ///
    /// `start_in` is not inherited: an update without one sends right away.
    pub(crate) fn merged(&self, update: ItemUpdate) -> Self {
        Self {
            kind: self.kind,
            content: update.content.unwrap_or_else(|| self.content.clone()),
            period: update.period.unwrap_or(self.period),
            destinations: update
                .destinations
                .unwrap_or_else(|| self.destinations.clone()),
            remove_after: update.remove_after.unwrap_or(self.remove_after),
            start_in: update.start_in.unwrap_or(Duration::ZERO),
        }
    }

    pub(crate) fn set_destinations(&mut self, destinations: Destinations) {
        self.destinations = destinations;
    }

    pub(crate) fn set_remove_after(&mut self, remove_after: Option<RemoveAfter>) {
        self.remove_after = remove_after;
    }

    pub(crate) fn set_start_in(&mut self, start_in: Duration) {
        self.start_in = start_in;
    }
}

/// Fields to change on a live item.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub content: Option<ContentSource>,
    pub period: Option<Period>,
    pub destinations: Option<Destinations>,
    /// `Some(None)` clears the removal rule.
    pub remove_after: Option<Option<RemoveAfter>>,
    /// Delay before the first send after the update (zero if `None`).
    pub start_in: Option<Duration>,
}

impl ItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: impl Into<ContentSource>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_destinations(mut self, destinations: Destinations) -> Self {
        self.destinations = Some(destinations);
        self
    }

    pub fn with_remove_after(mut self, remove_after: RemoveAfter) -> Self {
        self.remove_after = Some(Some(remove_after));
        self
    }

    /// Sends until removed explicitly.
    pub fn without_remove_after(mut self) -> Self {
        self.remove_after = Some(None);
        self
    }

    pub fn with_start_in(mut self, start_in: Duration) -> Self {
        self.start_in = Some(start_in);
        self
    }
}
