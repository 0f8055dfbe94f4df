//! # Item destinations.
//!
//! An item either targets a fixed list of channels ([`Destinations::Fixed`]) or every
//! channel whose name matches a pattern in every server its group currently covers
//! ([`Destinations::Matching`]).
//!
//! Fixed destinations are given as [`DestinationRef`]s. An `Unresolved` id is looked up
//! once, during initialization; ids the directory does not know are dropped with a warning.

use std::fmt;

use regex::Regex;

use crate::collab::{Channel, ChannelId};
use crate::error::ValidationError;
use crate::groups::pattern::compile;

/// A destination as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationRef {
    /// Channel id still to be looked up.
    Unresolved(ChannelId),
    /// Channel already looked up.
    Resolved(Channel),
}

impl DestinationRef {
    /// Channel id of the destination.
    pub fn id(&self) -> ChannelId {
        match self {
            DestinationRef::Unresolved(id) => *id,
            DestinationRef::Resolved(ch) => ch.id,
        }
    }
}

impl From<ChannelId> for DestinationRef {
    fn from(id: ChannelId) -> Self {
        DestinationRef::Unresolved(id)
    }
}

impl From<Channel> for DestinationRef {
    fn from(ch: Channel) -> Self {
        DestinationRef::Resolved(ch)
    }
}

/// Channel name pattern.
#[derive(Clone)]
pub struct ChannelPattern {
    regex: Regex,
}

impl ChannelPattern {
    /// Compiles `pattern` (whitespace around `|` is stripped).
    pub fn new(pattern: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }

    /// True if the channel name matches.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Normalized pattern.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChannelPattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for ChannelPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Where an item delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum Destinations {
    /// Ordered, de-duplicated channel list.
    Fixed(Vec<DestinationRef>),
    /// Channels matching a name pattern, evaluated at send time.
    Matching(ChannelPattern),
}

impl Destinations {
    /// Builds a fixed list, keeping the first occurrence of each channel id.
    ///
    /// # Example
    /// ```
    /// use relaycast::{ChannelId, Destinations};
    ///
    /// let d = Destinations::fixed([ChannelId(1), ChannelId(2), ChannelId(1)]);
    /// let Destinations::Fixed(list) = d else { unreachable!() };
    /// assert_eq!(list.len(), 2);
    /// ```
    pub fn fixed<I, D>(refs: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DestinationRef>,
    {
        let mut out: Vec<DestinationRef> = Vec::new();
        for r in refs {
            let r = r.into();
            if !out.iter().any(|o| o.id() == r.id()) {
                out.push(r);
            }
        }
        Destinations::Fixed(out)
    }

    /// Builds a pattern destination.
    pub fn matching(pattern: &str) -> Result<Self, ValidationError> {
        Ok(Destinations::Matching(ChannelPattern::new(pattern)?))
    }
}
