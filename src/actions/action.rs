use serde::{Deserialize, Serialize};

use crate::core::{ActivityState, ViewerId};
use crate::error::EngineError;
use crate::widgets::{WidgetConfig, WidgetKind, WidgetPath};

/// Payload of an action sent by a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click,
    Selector { new_selected: Option<String> },
    Slider { new_value: f64 },
    Switch { new_state: bool },
}

impl Action {
    /// Kind of widget this payload is meant for.
    pub fn target_kind(&self) -> WidgetKind {
        match self {
            Action::Click => WidgetKind::Click,
            Action::Selector { .. } => WidgetKind::Selector,
            Action::Slider { .. } => WidgetKind::Slider,
            Action::Switch { .. } => WidgetKind::Switch,
        }
    }

    /// Checks an untrusted payload against the target widget's config.
    pub(crate) fn validate(&self, path: &WidgetPath, config: &WidgetConfig) -> Result<(), EngineError> {
        let unsupported = |reason: String| EngineError::unsupported(path.as_str(), reason);

        match (self, config) {
            (Action::Click, WidgetConfig::Click(_)) | (Action::Switch { .. }, WidgetConfig::Switch(_)) => {
                Ok(())
            }
            (Action::Slider { new_value }, WidgetConfig::Slider(s)) => {
                if !new_value.is_finite() || *new_value < s.min || *new_value > s.max {
                    return Err(unsupported(format!(
                        "slider value {new_value} outside [{}, {}]",
                        s.min, s.max
                    )));
                }
                Ok(())
            }
            (Action::Selector { new_selected }, WidgetConfig::Selector(s)) => match new_selected {
                Some(choice) if !s.choices.contains(choice) => {
                    Err(unsupported(format!("'{choice}' is not one of the choices")))
                }
                _ => Ok(()),
            },
            (action, config) => Err(unsupported(format!(
                "{} action sent to a {} widget",
                action.target_kind(),
                config.kind()
            ))),
        }
    }
}

/// Action addressed to a widget, as received from a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub target_path: WidgetPath,
    pub action: Action,
}

impl ActionEnvelope {
    pub fn new(target_path: WidgetPath, action: Action) -> Self {
        Self {
            target_path,
            action,
        }
    }

    /// Parses an envelope from untrusted JSON.
    ///
    /// The path is validated while parsing; payload values are checked against the widget
    /// only at dispatch time.
    ///
    /// # Example
    /// ```
    /// use livedash::{Action, ActionEnvelope};
    ///
    /// let env = ActionEnvelope::from_json(
    ///     r#"{"target_path": "app.speed", "action": {"type": "slider", "new_value": 2.5}}"#,
    /// ).unwrap();
    /// assert_eq!(env.action, Action::Slider { new_value: 2.5 });
    /// assert!(ActionEnvelope::from_json(r#"{"target_path": "a..b", "action": {"type": "click"}}"#).is_err());
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// What a callback receives.
///
/// Action deliveries carry `activity = Action` and the sending viewer. Widget-level
/// activity notices (first watcher arrived, last watcher left) carry `Awake` or `Suspend`
/// and no action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    pub path: WidgetPath,
    pub viewer: Option<ViewerId>,
    pub activity: ActivityState,
    pub action: Option<Action>,
}

impl ActionEvent {
    pub(crate) fn action(path: WidgetPath, viewer: ViewerId, action: Action) -> Self {
        Self {
            path,
            viewer: Some(viewer),
            activity: ActivityState::Action,
            action: Some(action),
        }
    }

    pub(crate) fn activity(path: WidgetPath, activity: ActivityState) -> Self {
        Self {
            path,
            viewer: None,
            activity,
            action: None,
        }
    }
}
