//! # Item and group lifetime.
//!
//! [`RemoveAfter`] is what the caller asks for; [`Lifetime`] is what an initialized
//! object tracks. A relative duration becomes an absolute deadline when the object
//! is initialized, so re-initializing does not extend it.

use std::time::{Duration, SystemTime};

/// When an item or group should be removed automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveAfter {
    /// After this many sends that produced content (items only).
    Sends(u32),
    /// This long after initialization.
    After(Duration),
    /// At this wall-clock instant.
    At(SystemTime),
}

/// Remaining lifetime of an initialized object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Never expires on its own.
    #[default]
    Unlimited,
    /// Sends left.
    Sends(u32),
    /// Absolute deadline.
    Deadline(SystemTime),
}

impl Lifetime {
    /// Converts a request into a lifetime anchored at `now`.
    pub fn from_request(req: Option<RemoveAfter>, now: SystemTime) -> Self {
        match req {
            None => Lifetime::Unlimited,
            Some(RemoveAfter::Sends(n)) => Lifetime::Sends(n),
            Some(RemoveAfter::After(d)) => Lifetime::Deadline(now + d),
            Some(RemoveAfter::At(at)) => Lifetime::Deadline(at),
        }
    }

    /// True once the lifetime is used up.
    pub fn expired(&self, now: SystemTime) -> bool {
        match *self {
            Lifetime::Unlimited => false,
            Lifetime::Sends(left) => left == 0,
            Lifetime::Deadline(at) => now >= at,
        }
    }

    /// Accounts for one send that produced content.
    pub fn record_send(&mut self) {
        if let Lifetime::Sends(left) = self {
            *left = left.saturating_sub(1);
        }
    }

    /// Expresses the remaining lifetime as a request, so it survives re-initialization.
    pub fn as_request(&self) -> Option<RemoveAfter> {
        match *self {
            Lifetime::Unlimited => None,
            Lifetime::Sends(left) => Some(RemoveAfter::Sends(left)),
            Lifetime::Deadline(at) => Some(RemoveAfter::At(at)),
        }
    }

    /// Deadline, if the lifetime is time based.
    pub fn deadline(&self) -> Option<SystemTime> {
        match *self {
            Lifetime::Deadline(at) => Some(at),
            _ => None,
        }
    }
}
