use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
    InApp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Template rendered against the context (`{{ priority }}`, `{{ status }}`).
    #[serde(alias = "msg")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub channel: NotificationChannel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldConfig {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpConfig {
    #[serde(default = "default_follow_up_due")]
    pub due: String,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

fn default_follow_up_due() -> String {
    "24_hours_from_now".to_owned()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum Action {
    SendNotification(NotificationConfig),
    UpdateField(UpdateFieldConfig),
    ScheduleFollowUp(FollowUpConfig),
    Workflow(WorkflowConfig),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendNotification(_) => "send_notification",
            Self::UpdateField(_) => "update_field",
            Self::ScheduleFollowUp(_) => "schedule_follow_up",
            Self::Workflow(_) => "workflow",
        }
    }

    pub fn notify(message: impl Into<String>) -> Self {
        Self::SendNotification(NotificationConfig {
            message: message.into(),
            subject: None,
            recipients: Vec::new(),
            channel: NotificationChannel::default(),
        })
    }

    pub fn update_field(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::UpdateField(UpdateFieldConfig { field: field.into(), value: value.into() })
    }

    pub fn follow_up(due: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScheduleFollowUp(FollowUpConfig {
            due: due.into(),
            message: message.into(),
            assignee: None,
        })
    }

    pub fn workflow(actions: Vec<Action>) -> Self {
        Self::Workflow(WorkflowConfig { actions })
    }

    /// Deepest workflow nesting below this action; plain actions are depth 0.
    pub fn nesting_depth(&self) -> usize {
        match self {
            Self::Workflow(config) => {
                1 + config.actions.iter().map(Action::nesting_depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Action, NotificationChannel};

    #[test]
    fn actions_decode_from_kind_and_config() {
        let action: Action = serde_json::from_value(json!({
            "kind": "workflow",
            "config": {
                "actions": [
                    { "kind": "send_notification", "config": { "msg": "VIP case opened" } },
                    { "kind": "update_field", "config": { "field": "priority", "value": "high" } },
                    { "kind": "schedule_follow_up", "config": { "message": "check in" } }
                ]
            }
        }))
        .expect("decode workflow");

        let Action::Workflow(workflow) = &action else {
            panic!("expected workflow action");
        };
        assert_eq!(workflow.actions.len(), 3);
        assert!(matches!(
            &workflow.actions[0],
            Action::SendNotification(config)
                if config.message == "VIP case opened"
                    && config.channel == NotificationChannel::Email
        ));
        assert!(matches!(
            &workflow.actions[2],
            Action::ScheduleFollowUp(config) if config.due == "24_hours_from_now"
        ));
        assert_eq!(action.nesting_depth(), 1);
    }

    #[test]
    fn nesting_depth_counts_workflow_levels() {
        let nested = Action::workflow(vec![
            Action::notify("a"),
            Action::workflow(vec![Action::workflow(vec![Action::update_field("x", "y")])]),
        ]);

        assert_eq!(nested.nesting_depth(), 3);
        assert_eq!(Action::notify("plain").nesting_depth(), 0);
    }
}
