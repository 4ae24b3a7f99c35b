//! Business entry points invoked by workers.

use crate::error::Result;
use crate::model::{JobEvent, Message};
use async_trait::async_trait;

/// Handles one leased message. An `Err` leaves the message unacknowledged
/// for redelivery, so implementations must tolerate running twice.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_job(&self, message: &Message) -> Result<()>;
}

/// Handles one decoded [`JobEvent`]. Registered with a
/// [`Dispatcher`](super::dispatch::Dispatcher) per (domain, action).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &JobEvent, message: &Message) -> Result<()>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for std::sync::Arc<H> {
    async fn handle_event(&self, event: &JobEvent, message: &Message) -> Result<()> {
        (**self).handle_event(event, message).await
    }
}
