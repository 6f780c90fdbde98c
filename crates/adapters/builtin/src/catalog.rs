//! Schemas of the built-in actions and events.

use std::collections::BTreeMap;

use phonebot_domain::catalog::{ActionSchema, Catalog, EventSchema};
use phonebot_domain::error::UnknownTypeError;
use phonebot_domain::event::{DEBUG_POKE, TIME_TICK};
use phonebot_domain::property::{PropertySubType, PropertyType, Value};
use phonebot_domain::registry::TypeRegistry;

/// Upper bound of the `delay` action, one day.
const MAX_DELAY_SECONDS: f64 = 86_400.0;

/// Catalog with every built-in action and the `time.tick` and `debug.poke`
/// events.
///
/// # Errors
///
/// Returns [`UnknownTypeError`] if the default registry lacks one of the
/// property shapes used here.
pub fn catalog() -> Result<Catalog, UnknownTypeError> {
    let r = TypeRegistry::default();
    let mut catalog = Catalog::default();

    catalog.register_action(
        ActionSchema::new("log", "Log")
            .with_description("Write a message to the log")
            .with_property(
                r.describe("message", PropertyType::String, PropertySubType::None)?
                    .with_description("Message")
                    .non_empty()
                    .required(),
            )
            .with_property(
                r.describe("level", PropertyType::String, PropertySubType::Choice)?
                    .with_description("Log level")
                    .with_choice("Debug", "debug")
                    .with_choice("Info", "info")
                    .with_choice("Warning", "warn")
                    .with_choice("Error", "error")
                    .with_default(Value::String("info".into())),
            )
            .with_summary("Log {message}"),
    );

    catalog.register_action(
        ActionSchema::new("delay", "Delay")
            .with_description("Wait before running the next action")
            .with_property(
                r.describe("seconds", PropertyType::Double, PropertySubType::None)?
                    .with_description("Seconds to wait")
                    .with_range(0.0, MAX_DELAY_SECONDS)
                    .required(),
            )
            .with_summary("Wait {seconds} s"),
    );

    catalog.register_action(
        ActionSchema::new("launch_application", "Launch application")
            .with_property(
                r.describe(
                    "application",
                    PropertyType::String,
                    PropertySubType::Application,
                )?
                .with_description("Application to launch")
                .required(),
            )
            .with_summary("Launch {application}"),
    );

    catalog.register_action(
        ActionSchema::new("open_url", "Open URL")
            .with_property(
                r.describe("url", PropertyType::String, PropertySubType::None)?
                    .with_description("Url to open")
                    .non_empty()
                    .required(),
            )
            .with_summary("Open url {url}"),
    );

    catalog.register_action(
        ActionSchema::new("set_profile", "Set profile")
            .with_property(
                r.describe("profile", PropertyType::String, PropertySubType::Choice)?
                    .with_description("Profile to set")
                    .with_choice("Standard profile", "ambience")
                    .with_choice("Silent profile", "silent")
                    .required(),
            )
            .with_summary("Set profile {profile}"),
    );

    catalog.register_action(
        ActionSchema::new("notify", "Notification")
            .with_property(
                r.describe("summary", PropertyType::String, PropertySubType::None)?
                    .with_description("Notification summary"),
            )
            .with_property(
                r.describe("body", PropertyType::String, PropertySubType::None)?
                    .with_description("Notification text"),
            ),
    );

    for (action_type, name, description) in [
        ("wlan_switch", "WLAN switch", "Switch WLAN"),
        ("data_switch", "Mobile data switch", "Switch data"),
    ] {
        catalog.register_action(
            ActionSchema::new(action_type, name).with_property(
                r.describe("enable", PropertyType::Bool, PropertySubType::None)?
                    .with_description(description)
                    .required(),
            ),
        );
    }

    catalog.register_event(
        EventSchema::new(TIME_TICK)
            .with_field(r.describe("time", PropertyType::Time, PropertySubType::None)?)
            .with_field(
                r.describe("hour", PropertyType::Int, PropertySubType::None)?
                    .with_range(0.0, 23.0),
            )
            .with_field(
                r.describe("minute", PropertyType::Int, PropertySubType::None)?
                    .with_range(0.0, 59.0),
            )
            .with_field(
                r.describe("weekday", PropertyType::Int, PropertySubType::None)?
                    .with_description("1 = Monday, 7 = Sunday")
                    .with_range(1.0, 7.0),
            ),
    );
    catalog.register_event(
        EventSchema::new(DEBUG_POKE).with_field(
            r.describe("path", PropertyType::String, PropertySubType::None)?
                .with_description("Which poke fired, \"/\" when unnamed"),
        ),
    );

    Ok(catalog)
}

/// One-line description of a configured action, e.g. `Open url https://…`.
///
/// Returns `None` when the action is unknown or not configured enough to
/// describe.
#[must_use]
pub fn summary(
    catalog: &Catalog,
    action_type: &str,
    values: &BTreeMap<String, Value>,
) -> Option<String> {
    let text = |name: &str| {
        values
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    match action_type {
        "notify" => match (text("summary"), text("body")) {
            (Some(summary), None) => Some(summary.to_string()),
            (None, Some(body)) => Some(body.to_string()),
            (Some(summary), Some(body)) => Some(format!("{summary}, {body}")),
            (None, None) => None,
        },
        "wlan_switch" | "data_switch" => {
            let Some(Value::Bool(enable)) = values.get("enable") else {
                return None;
            };
            let what = if action_type == "wlan_switch" { "WLAN" } else { "data" };
            Some(if *enable {
                format!("Enable {what}")
            } else {
                format!("Disable {what}")
            })
        }
        _ => catalog.action(action_type)?.summarize(values),
    }
}
