//! Event bus port: publish/subscribe for events.

use std::future::Future;

use phonebot_domain::error::PhoneBotError;
use phonebot_domain::event::Event;

/// Publishes events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), PhoneBotError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), PhoneBotError>> + Send {
        (**self).publish(event)
    }
}
