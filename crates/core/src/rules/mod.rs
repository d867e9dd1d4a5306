pub mod action;
pub mod condition;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::WorkspaceId;

pub use action::{
    Action, FollowUpConfig, NotificationChannel, NotificationConfig, UpdateFieldConfig,
    WorkflowConfig,
};
pub use condition::{Condition, Operator};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    #[serde(alias = "field-change")]
    FieldChange,
    #[serde(alias = "time-based")]
    TimeBased,
    Manual,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldChange => "field_change",
            Self::TimeBased => "time_based",
            Self::Manual => "manual",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unsupported trigger kind `{0}` (expected field_change|time_based|manual)")]
pub struct TriggerParseError(pub String);

impl std::str::FromStr for TriggerKind {
    type Err = TriggerParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "field_change" => Ok(Self::FieldChange),
            "time_based" => Ok(Self::TimeBased),
            "manual" => Ok(Self::Manual),
            other => Err(TriggerParseError(other.to_string())),
        }
    }
}

/// A condition→action pair. Lower priority values evaluate first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub trigger: TriggerKind,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RuleId(id.into()),
            name: name.into(),
            trigger: TriggerKind::FieldChange,
            conditions: Vec::new(),
            actions: Vec::new(),
            active: true,
            priority: 0,
            created_at: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Ascending priority, ties broken by creation time. Rules without a creation time
/// follow those that have one and keep their input order.
pub(crate) fn sort_for_evaluation(rules: &mut [&Rule]) {
    rules.sort_by(|left, right| {
        left.priority.cmp(&right.priority).then_with(|| {
            match (left.created_at, right.created_at) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        })
    });
}

/// All rules configured for one workspace, in creation order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub workspace_id: WorkspaceId,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(workspace_id: WorkspaceId, rules: Vec<Rule>) -> Self {
        Self { workspace_id, rules }
    }

    /// Active rules for a trigger in evaluation order.
    pub fn eligible(&self, trigger: TriggerKind) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> =
            self.rules.iter().filter(|rule| rule.active && rule.trigger == trigger).collect();
        sort_for_evaluation(&mut rules);
        rules
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| &rule.id == id)
    }
}
