//! Presentation hints: which widget edits a property and which selector
//! screen, if any, picks its value.
//!
//! The core never touches UI state. It answers with plain data: a
//! [`Widget`] for inline editing and, when a dedicated picker is needed, a
//! [`SelectorRequest`] that the UI layer interprets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::RuleId;
use crate::property::{PropertyDescriptor, PropertySubType, PropertyType};

/// Inline editor used to present a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    TextField,
    ComboBox,
    /// A button that opens a [`Selector`].
    DialogButton,
    IntField,
    DoubleField,
    Switch,
}

/// Dedicated picker screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    TimePicker,
    ApplicationPicker,
}

/// The property a selector screen will write back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorTarget {
    pub rule_id: RuleId,
    pub action_index: usize,
    pub property: String,
}

/// Instruction for the UI layer: open `selector` to edit `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRequest {
    pub selector: Selector,
    pub target: SelectorTarget,
}

/// Lookup table from `(type, subtype)` to presentation, built once.
#[derive(Debug, Clone)]
pub struct PresentationTable {
    widgets: HashMap<(PropertyType, PropertySubType), Widget>,
    selectors: HashMap<(PropertyType, PropertySubType), Selector>,
}

impl Default for PresentationTable {
    fn default() -> Self {
        use PropertySubType as S;
        use PropertyType as T;

        let widgets = HashMap::from([
            ((T::String, S::None), Widget::TextField),
            ((T::String, S::Choice), Widget::ComboBox),
            ((T::String, S::Application), Widget::DialogButton),
            ((T::Int, S::None), Widget::IntField),
            ((T::Double, S::None), Widget::DoubleField),
            ((T::Bool, S::None), Widget::Switch),
        ]);
        let selectors = HashMap::from([
            ((T::Time, S::None), Selector::TimePicker),
            ((T::String, S::Application), Selector::ApplicationPicker),
        ]);
        Self { widgets, selectors }
    }
}

impl PresentationTable {
    /// Widget for the pair; anything without a dedicated editor gets a
    /// [`Widget::DialogButton`].
    #[must_use]
    pub fn widget(&self, ty: PropertyType, subtype: PropertySubType) -> Widget {
        self.widgets
            .get(&(ty, subtype))
            .copied()
            .unwrap_or(Widget::DialogButton)
    }

    #[must_use]
    pub fn widget_for(&self, descriptor: &PropertyDescriptor) -> Widget {
        self.widget(descriptor.ty(), descriptor.subtype())
    }

    #[must_use]
    pub fn selector(&self, ty: PropertyType, subtype: PropertySubType) -> Option<Selector> {
        self.selectors.get(&(ty, subtype)).copied()
    }

    /// Build the request to open the selector for `descriptor`, or `None`
    /// when the property is edited inline.
    #[must_use]
    pub fn selector_request(
        &self,
        descriptor: &PropertyDescriptor,
        rule_id: RuleId,
        action_index: usize,
    ) -> Option<SelectorRequest> {
        let selector = self.selector(descriptor.ty(), descriptor.subtype())?;
        Some(SelectorRequest {
            selector,
            target: SelectorTarget {
                rule_id,
                action_index,
                property: descriptor.name().to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    #[test]
    fn should_map_registered_pairs_to_widgets() {
        let table = PresentationTable::default();
        assert_eq!(table.widget(PropertyType::String, PropertySubType::None), Widget::TextField);
        assert_eq!(table.widget(PropertyType::String, PropertySubType::Choice), Widget::ComboBox);
        assert_eq!(
            table.widget(PropertyType::String, PropertySubType::Application),
            Widget::DialogButton
        );
        assert_eq!(table.widget(PropertyType::Int, PropertySubType::None), Widget::IntField);
        assert_eq!(table.widget(PropertyType::Double, PropertySubType::None), Widget::DoubleField);
        assert_eq!(table.widget(PropertyType::Bool, PropertySubType::None), Widget::Switch);
    }

    #[test]
    fn should_fall_back_to_dialog_button_for_time() {
        let table = PresentationTable::default();
        assert_eq!(table.widget(PropertyType::Time, PropertySubType::None), Widget::DialogButton);
    }

    #[test]
    fn should_request_time_picker_for_time_property() {
        let table = PresentationTable::default();
        let descriptor = TypeRegistry::default()
            .describe("at", PropertyType::Time, PropertySubType::None)
            .unwrap();
        let rule_id = RuleId::new();

        let request = table.selector_request(&descriptor, rule_id, 2).unwrap();

        assert_eq!(request.selector, Selector::TimePicker);
        assert_eq!(request.target.rule_id, rule_id);
        assert_eq!(request.target.action_index, 2);
        assert_eq!(request.target.property, "at");
    }

    #[test]
    fn should_request_application_picker_for_application_property() {
        let table = PresentationTable::default();
        assert_eq!(
            table.selector(PropertyType::String, PropertySubType::Application),
            Some(Selector::ApplicationPicker)
        );
    }

    #[test]
    fn should_not_request_selector_for_inline_properties() {
        let table = PresentationTable::default();
        let descriptor = TypeRegistry::default()
            .describe("url", PropertyType::String, PropertySubType::None)
            .unwrap();
        assert!(table.selector_request(&descriptor, RuleId::new(), 0).is_none());
    }
}
