//! Externally driven `debug.poke` events.
//!
//! Each poke names a path; rules tell pokes apart by comparing on it.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use phonebot_app::ports::EventPublisher;
use phonebot_domain::error::PhoneBotError;
use phonebot_domain::event::{DEBUG_POKE, Event};
use phonebot_domain::property::Value;

/// Path used when a poke does not name one.
const ROOT_PATH: &str = "/";

/// Build the `debug.poke` event for `path`.
#[must_use]
pub fn poke_event(path: &str) -> Event {
    let path = if path.trim().is_empty() {
        ROOT_PATH
    } else {
        path.trim()
    };
    Event::new(DEBUG_POKE).with_field("path", Value::String(path.to_string()))
}

/// Publishes a `debug.poke` for every path it receives.
pub struct Poke<P> {
    publisher: P,
}

impl<P: EventPublisher> Poke<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    /// Publish one poke.
    ///
    /// # Errors
    ///
    /// Returns the publisher's error.
    pub async fn poke(&self, path: &str) -> Result<(), PhoneBotError> {
        let event = poke_event(path);
        tracing::debug!(event_id = %event.id, path = ?event.field("path"), "poke");
        self.publisher.publish(event).await
    }

    /// Drain `pokes` until `shutdown` is cancelled or every sender is gone.
    pub async fn run(&self, mut pokes: mpsc::Receiver<String>, shutdown: CancellationToken) {
        tracing::info!("poke source started");
        loop {
            let path = tokio::select! {
                () = shutdown.cancelled() => break,
                received = pokes.recv() => match received {
                    Some(path) => path,
                    None => break,
                },
            };
            if let Err(err) = self.poke(&path).await {
                tracing::warn!(error = %err, "failed to publish poke");
            }
        }
        tracing::info!("poke source stopped");
    }
}
