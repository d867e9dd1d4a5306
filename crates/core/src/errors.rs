use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where inside a rule a failure was observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorLocation {
    Rule,
    Condition { index: usize, field: String },
    Action { path: String, kind: String },
}

impl ErrorLocation {
    pub fn condition(index: usize, field: impl Into<String>) -> Self {
        Self::Condition { index, field: field.into() }
    }

    pub fn action(path: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Action { path: path.into(), kind: kind.into() }
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => f.write_str("rule"),
            Self::Condition { index, field } => write!(f, "condition[{index}] on `{field}`"),
            Self::Action { path, kind } => write!(f, "action[{path}] {kind}"),
        }
    }
}

/// Failures recorded in an evaluation result. None of them abort a pass.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleError {
    #[error("configuration error at {location}: {message}")]
    Configuration { location: ErrorLocation, message: String },
    #[error("evaluation error at {location}: {message}")]
    Evaluation { location: ErrorLocation, message: String },
    #[error("undeclared status transition at {location}: `{from}` -> `{to}`")]
    Transition { location: ErrorLocation, from: String, to: String },
}

impl RuleError {
    pub fn configuration(location: ErrorLocation, message: impl Into<String>) -> Self {
        Self::Configuration { location, message: message.into() }
    }

    pub fn evaluation(location: ErrorLocation, message: impl Into<String>) -> Self {
        Self::Evaluation { location, message: message.into() }
    }

    pub fn location(&self) -> &ErrorLocation {
        match self {
            Self::Configuration { location, .. }
            | Self::Evaluation { location, .. }
            | Self::Transition { location, .. } => location,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Evaluation { .. } => "evaluation",
            Self::Transition { .. } => "transition",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("status `{status}` is not part of the workflow")]
    UnknownStatus { from: String, status: String },
    #[error("no transition declared from `{from}` to `{to}`")]
    Undeclared { from: String, to: String },
}

impl TransitionError {
    pub fn into_rule_error(self, location: ErrorLocation) -> RuleError {
        match self {
            Self::UnknownStatus { from, status } => {
                RuleError::Transition { location, from, to: status }
            }
            Self::Undeclared { from, to } => RuleError::Transition { location, from, to },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("default status `{0}` is not a declared status")]
    UnknownDefaultStatus(String),
    #[error("transition `{label}` references undeclared status `{status}`")]
    UnknownTransitionStatus { label: String, status: String },
    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),
    #[error("choice field `{0}` declares no choices")]
    MissingChoices(String),
    #[error("default priority `{priority}` is not a choice of the `priority` field")]
    InvalidDefaultPriority { priority: String },
}

#[cfg(test)]
mod tests {
    use super::{ErrorLocation, RuleError, TransitionError};

    #[test]
    fn rule_error_display_names_location() {
        let error = RuleError::evaluation(
            ErrorLocation::condition(2, "amount"),
            "cannot order text value against number",
        );

        assert_eq!(
            error.to_string(),
            "evaluation error at condition[2] on `amount`: cannot order text value against number"
        );
        assert_eq!(error.class(), "evaluation");
    }

    #[test]
    fn transition_error_keeps_both_endpoints() {
        let error = TransitionError::Undeclared { from: "open".to_owned(), to: "closed".to_owned() }
            .into_rule_error(ErrorLocation::action("0", "update_field"));

        assert!(matches!(
            error,
            RuleError::Transition { ref from, ref to, .. } if from == "open" && to == "closed"
        ));
        assert_eq!(
            error.to_string(),
            "undeclared status transition at action[0] update_field: `open` -> `closed`"
        );
    }
}
