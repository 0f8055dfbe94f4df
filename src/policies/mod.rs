//! Scheduling policies.
//!
//! This module groups the knobs that control **when** an item sends again
//! and **when** an item or group stops on its own.
//!
//! ## Contents
//! - [`Period`] delay between sends (fixed, or uniform over `[start, end)`)
//! - [`RemoveAfter`] requested lifetime (send count, duration, or deadline)
//! - [`Lifetime`] remaining lifetime tracked by an initialized object
//!
//! ## Quick wiring
//! ```text
//! ItemSpec { period: Period, remove_after: Option<RemoveAfter>, start_in }
//!      └─► items::SendableItem uses:
//!           - start_in for the first arm, period.sample() for every re-arm
//!           - lifetime.expired(now) inside check_state()
//! ```

mod lifetime;
mod period;

pub use lifetime::{Lifetime, RemoveAfter};
pub use period::Period;
