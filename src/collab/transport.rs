//! # Transport: per-destination delivery.
//!
//! The engine calls [`Transport::send`] once per destination while holding the owning
//! group's send lock, then [`Transport::release`] before moving to the next destination.
//! The [`Session`] passed in is owned by the group, so a transport can keep one live
//! connection (for example a voice connection) per group without any process-wide state.

use std::any::Any;

use async_trait::async_trait;

use crate::collab::Channel;
use crate::error::DeliveryFailure;
use crate::items::Payload;

/// Group-owned transport state.
///
/// Holds at most one connection of a transport-defined type. Only the holder of the
/// group's send lock can reach it.
#[derive(Default)]
pub struct Session {
    connection: Option<Box<dyn Any + Send>>,
}

impl Session {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a connection is stored.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Stores `conn`, replacing any previous connection.
    pub fn connect<T: Any + Send>(&mut self, conn: T) {
        self.connection = Some(Box::new(conn));
    }

    /// Borrows the stored connection if it has type `T`.
    pub fn connection<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.connection.as_mut()?.downcast_mut::<T>()
    }

    /// Takes the stored connection out if it has type `T`.
    pub fn take<T: Any + Send>(&mut self) -> Option<T> {
        let boxed = self.connection.take()?;
        match boxed.downcast::<T>() {
            Ok(conn) => Some(*conn),
            Err(other) => {
                self.connection = Some(other);
                None
            }
        }
    }

    /// Drops whatever is stored.
    pub fn clear(&mut self) {
        self.connection = None;
    }
}

/// Delivers payloads to destinations.
///
/// Failures must be classified: [`DeliveryFailure::PermissionDenied`] and
/// [`DeliveryFailure::NotFound`] prune the destination, anything else is retried.
/// Timeouts are the transport's business and surface as [`DeliveryFailure::Other`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers `payload` into `channel`.
    async fn send(
        &self,
        session: &mut Session,
        channel: &Channel,
        payload: &Payload,
    ) -> Result<(), DeliveryFailure>;

    /// Tears down whatever `send` left in the session.
    ///
    /// Called between destinations and when the owning group closes.
    async fn release(&self, session: &mut Session) {
        session.clear();
    }
}
