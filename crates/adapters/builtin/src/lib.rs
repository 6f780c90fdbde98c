//! # phonebot-adapter-builtin
//!
//! Actions and event sources that ship with phonebot.
//!
//! ## Provided actions
//!
//! | Action | Properties | Behaviour |
//! |--------|------------|-----------|
//! | `log` | `message`, `level` | Writes a tracing event |
//! | `delay` | `seconds` | Waits, observing cancellation |
//! | `launch_application` | `application` | Publishes `intent.launch_application` |
//! | `open_url` | `url` | Publishes `intent.open_url` |
//! | `set_profile` | `profile` | Publishes `intent.set_profile` |
//! | `notify` | `summary`, `body` | Publishes `intent.notify` |
//! | `wlan_switch` | `enable` | Publishes `intent.wlan_switch` |
//! | `data_switch` | `enable` | Publishes `intent.data_switch` |
//!
//! Platform side effects are not performed here: the intent events carry the
//! validated properties for whatever platform integration listens on the bus.
//!
//! ## Provided event sources
//!
//! [`Clock`] publishes a `time.tick` event at the start of every minute.
//! [`Poke`] publishes a `debug.poke` event, carrying a `path`, for every
//! path sent to it.
//!
//! ## Dependency rule
//!
//! Depends on `phonebot-app` (port traits) and `phonebot-domain` only.

mod catalog;
mod clock;
mod executor;
mod poke;

pub use catalog::{catalog, summary};
pub use clock::{Clock, tick_event};
pub use executor::BuiltinExecutor;
pub use poke::{Poke, poke_event};
