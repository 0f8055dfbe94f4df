//! Delivery reports handed to the log sink.

use std::collections::HashSet;

use crate::collab::{Channel, ChannelId, ChannelKind, ServerId};
use crate::error::DeliveryFailure;
use crate::items::{ItemId, Payload};

/// Channel a payload was delivered to (or attempted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    pub server: ServerId,
}

impl From<&Channel> for ChannelRecord {
    fn from(ch: &Channel) -> Self {
        Self {
            id: ch.id,
            name: ch.name.clone(),
            server: ch.server,
        }
    }
}

/// Failed attempt with its classified reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub channel: ChannelRecord,
    pub reason: DeliveryFailure,
}

/// Outcome of one send of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub item: ItemId,
    pub kind: ChannelKind,
    pub payload: Payload,
    pub successful: Vec<ChannelRecord>,
    pub failed: Vec<FailedRecord>,
}

impl DeliveryReport {
    /// Keeps only records for `channels`; `None` if nothing is left.
    pub fn restricted_to(&self, channels: &HashSet<ChannelId>) -> Option<Self> {
        let successful: Vec<_> = self
            .successful
            .iter()
            .filter(|r| channels.contains(&r.id))
            .cloned()
            .collect();
        let failed: Vec<_> = self
            .failed
            .iter()
            .filter(|r| channels.contains(&r.channel.id))
            .cloned()
            .collect();

        if successful.is_empty() && failed.is_empty() {
            return None;
        }
        Some(Self {
            item: self.item,
            kind: self.kind,
            payload: self.payload.clone(),
            successful,
            failed,
        })
    }

    /// True if no destination was attempted.
    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u64) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId(id),
            name: format!("c{id}"),
            server: ServerId(1),
        }
    }

    #[test]
    fn restriction_filters_and_drops_empty() {
        let report = DeliveryReport {
            item: crate::items::ItemId::next(),
            kind: ChannelKind::Text,
            payload: Payload::from("hi"),
            successful: vec![rec(1), rec(2)],
            failed: vec![FailedRecord {
                channel: rec(3),
                reason: DeliveryFailure::Other("slow".into()),
            }],
        };

        let only_three: HashSet<_> = [ChannelId(3)].into();
        let r = report.restricted_to(&only_three).unwrap();
        assert!(r.successful.is_empty());
        assert_eq!(r.failed.len(), 1);

        let none: HashSet<_> = [ChannelId(9)].into();
        assert!(report.restricted_to(&none).is_none());
    }
}
