//! Minute clock publishing `time.tick` events.

use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, TimeDelta, Timelike};
use tokio_util::sync::CancellationToken;

use phonebot_app::ports::EventPublisher;
use phonebot_domain::event::{Event, TIME_TICK};
use phonebot_domain::property::Value;

/// Build the `time.tick` event for the minute containing `at`.
#[must_use]
pub fn tick_event(at: NaiveDateTime) -> Event {
    let time = at.time().with_second(0).and_then(|t| t.with_nanosecond(0));
    let mut event = Event::new(TIME_TICK)
        .with_field("hour", Value::Int(i64::from(at.hour())))
        .with_field("minute", Value::Int(i64::from(at.minute())))
        .with_field(
            "weekday",
            Value::Int(i64::from(at.weekday().number_from_monday())),
        );
    if let Some(time) = time {
        event = event.with_field("time", Value::Time(time));
    }
    event
}

/// Time left until the next minute boundary after `now`.
fn until_next_minute(now: NaiveDateTime) -> Duration {
    let elapsed = TimeDelta::seconds(i64::from(now.second()))
        + TimeDelta::nanoseconds(i64::from(now.nanosecond()));
    (TimeDelta::minutes(1) - elapsed)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

/// Publishes one `time.tick` per local wall-clock minute.
pub struct Clock<P> {
    publisher: P,
}

impl<P: EventPublisher> Clock<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    /// Tick at every minute boundary until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("clock started");
        loop {
            let wait = until_next_minute(Local::now().naive_local());
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            let event = tick_event(Local::now().naive_local());
            tracing::trace!(event_id = %event.id, "tick");
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(error = %err, "failed to publish tick");
            }
        }
        tracing::info!("clock stopped");
    }
}
