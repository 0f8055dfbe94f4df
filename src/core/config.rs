//! # Global engine configuration.
//!
//! Provides [`Config`], the settings shared by every group an [`Engine`](crate::Engine) runs.
//!
//! ## Sentinel values
//! - `max_servers = 0` → no membership cap for auto-join
//! - `removal_buffer_length = 0` → removed items are not remembered

use std::time::Duration;

/// What to do when one server matches the patterns of several auto groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Every matching auto group delivers into the server.
    #[default]
    Duplicate,
    /// Only the earliest registered matching auto group delivers into the server.
    FirstMatchWins,
}

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `removal_buffer_length`: default capacity of each auto group's removed-item buffer
/// - `join_interval`: delay between two auto-join attempts
/// - `max_servers`: auto-join stops once the account is in this many servers (`0` = no cap)
/// - `join_settle`: wait after a join before checking the server became visible
/// - `overlap`: how overlapping auto group patterns are resolved
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Default size of the removed-item FIFO for auto groups.
    pub removal_buffer_length: usize,

    /// Delay between two auto-join attempts.
    pub join_interval: Duration,

    /// Membership cap for auto-join.
    ///
    /// - `0` = no cap
    /// - `n > 0` = stop joining once the account is in `n` servers
    pub max_servers: usize,

    /// Wait after a successful join before verifying visibility.
    pub join_settle: Duration,

    /// Resolution of servers matched by several auto groups.
    pub overlap: OverlapPolicy,
}

impl Config {
    /// Returns the membership cap as an `Option`.
    ///
    /// - `None` → no cap
    /// - `Some(n)` → stop joining at `n` servers
    #[inline]
    pub fn server_limit(&self) -> Option<usize> {
        if self.max_servers == 0 {
            None
        } else {
            Some(self.max_servers)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `removal_buffer_length = 50`
    /// - `join_interval = 45s`
    /// - `max_servers = 100` (platform membership cap)
    /// - `join_settle = 1s`
    /// - `overlap = OverlapPolicy::Duplicate`
    fn default() -> Self {
        Self {
            removal_buffer_length: 50,
            join_interval: Duration::from_secs(45),
            max_servers: 100,
            join_settle: Duration::from_secs(1),
            overlap: OverlapPolicy::Duplicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.removal_buffer_length, 50);
        assert_eq!(cfg.join_interval, Duration::from_secs(45));
        assert_eq!(cfg.server_limit(), Some(100));
        assert_eq!(cfg.overlap, OverlapPolicy::Duplicate);

        let unlimited = Config {
            max_servers: 0,
            ..Config::default()
        };
        assert_eq!(unlimited.server_limit(), None);
    }
}
