use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::WorkspaceId;
use crate::errors::SchemaError;
use crate::rules::Operator;
use crate::value::{FieldMap, FieldValue};

/// Name of the pseudo-field that resolves to a context's workflow status.
pub const STATUS_FIELD: &str = "status";
pub const PRIORITY_FIELD: &str = "priority";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    LongText,
    Number,
    Boolean,
    Date,
    DateTime,
    Choice,
    MultiChoice,
    Email,
    Phone,
    Url,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::LongText => "long_text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Choice => "choice",
            Self::MultiChoice => "multi_choice",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::LongText | Self::Email | Self::Phone | Self::Url)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    pub fn supports(self, operator: Operator) -> bool {
        match operator {
            Operator::Equals | Operator::NotEquals | Operator::ChangesTo => true,
            Operator::Contains => {
                self.is_textual() || matches!(self, Self::Choice | Self::MultiChoice)
            }
            Operator::GreaterThan | Operator::LessThan => {
                self == Self::Number || self.is_temporal()
            }
            Operator::IsBefore | Operator::IsAfter => self.is_temporal(),
        }
    }

    /// Whether a stored value has the shape this type declares. Null is handled
    /// by the caller (required-ness).
    pub fn accepts(self, value: &FieldValue) -> bool {
        match self {
            Self::Text | Self::LongText | Self::Email | Self::Phone | Self::Url | Self::Choice => {
                matches!(value, FieldValue::String(_))
            }
            Self::Number => value.as_number().is_some(),
            Self::Boolean => value.as_bool().is_some(),
            Self::Date | Self::DateTime => value.as_timestamp().is_some(),
            Self::MultiChoice => matches!(value, FieldValue::StringList(_)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    #[serde(default)]
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

impl FieldDefinition {
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        let key = key.into();
        Self {
            label: key.replace('_', " "),
            key,
            field_type,
            required: false,
            choices: Vec::new(),
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn allows_choice(&self, candidate: &str) -> bool {
        self.choices.iter().any(|choice| choice == candidate)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub key: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
}

/// Directed graph of allowed status changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusWorkflow {
    pub statuses: Vec<StatusDefinition>,
    pub transitions: Vec<StatusTransition>,
    pub default_status: String,
}

impl Default for StatusWorkflow {
    fn default() -> Self {
        let status = |key: &str, label: &str| StatusDefinition {
            key: key.to_owned(),
            label: label.to_owned(),
        };
        let edge = |from: &str, to: &str, label: &str| StatusTransition {
            from: from.to_owned(),
            to: to.to_owned(),
            label: label.to_owned(),
        };

        Self {
            statuses: vec![
                status("open", "Open"),
                status("in_progress", "In Progress"),
                status("resolved", "Resolved"),
            ],
            transitions: vec![
                edge("open", "in_progress", "Start work"),
                edge("open", "resolved", "Resolve"),
                edge("in_progress", "resolved", "Resolve"),
                edge("resolved", "open", "Reopen"),
            ],
            default_status: "open".to_owned(),
        }
    }
}

impl StatusWorkflow {
    pub fn has_status(&self, key: &str) -> bool {
        self.statuses.iter().any(|status| status.key == key)
    }

    pub fn transition(&self, from: &str, to: &str) -> Option<&StatusTransition> {
        self.transitions.iter().find(|edge| edge.from == from && edge.to == to)
    }

    pub fn transitions_from<'a>(
        &'a self,
        from: &'a str,
    ) -> impl Iterator<Item = &'a StatusTransition> + 'a {
        self.transitions.iter().filter(move |edge| edge.from == from)
    }

    pub fn is_reachable(&self, to: &str) -> bool {
        to == self.default_status || self.transitions.iter().any(|edge| edge.to == to)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if !self.has_status(&self.default_status) {
            return Err(SchemaError::UnknownDefaultStatus(self.default_status.clone()));
        }

        for edge in &self.transitions {
            for endpoint in [&edge.from, &edge.to] {
                if !self.has_status(endpoint) {
                    return Err(SchemaError::UnknownTransitionStatus {
                        label: edge.label.clone(),
                        status: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingRequired { field: String },
    TypeMismatch { field: String, expected: FieldType, found: String },
    InvalidChoice { field: String, value: String, choices: Vec<String> },
}

impl ValidationIssue {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingRequired { field }
            | Self::TypeMismatch { field, .. }
            | Self::InvalidChoice { field, .. } => field,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingRequired { field } => format!("required field `{field}` is missing"),
            Self::TypeMismatch { field, expected, found } => {
                format!("field `{field}` expects {} but holds {found}", expected.as_str())
            }
            Self::InvalidChoice { field, value, choices } => {
                format!("`{value}` is not an allowed choice for `{field}` ({})", choices.join("|"))
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("operator `{operator}` cannot be applied to {field_type} field `{field}`")]
pub struct IncompatibleOperator {
    pub field: String,
    pub field_type: &'static str,
    pub operator: Operator,
}

/// Per-workspace declaration of context fields and the status workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSchema {
    pub workspace_id: WorkspaceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub status_workflow: StatusWorkflow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_priority: Option<String>,
}

impl ContextSchema {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            name: String::new(),
            fields: Vec::new(),
            status_workflow: StatusWorkflow::default(),
            default_priority: None,
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_workflow(mut self, workflow: StatusWorkflow) -> Self {
        self.status_workflow = workflow;
        self
    }

    pub fn with_default_priority(mut self, priority: impl Into<String>) -> Self {
        self.default_priority = Some(priority.into());
        self
    }

    /// Definition of the top-level field a dot-path starts with.
    pub fn field(&self, path: &str) -> Option<&FieldDefinition> {
        let root = path.split('.').next().unwrap_or(path);
        self.fields.iter().find(|field| field.key == root)
    }

    /// Static compatibility of an operator with the declared field type.
    /// Undeclared fields and nested paths are not checked.
    pub fn check_operator(
        &self,
        path: &str,
        operator: Operator,
    ) -> Result<(), IncompatibleOperator> {
        if path == STATUS_FIELD {
            return match operator {
                Operator::Equals | Operator::NotEquals | Operator::ChangesTo => Ok(()),
                _ => Err(IncompatibleOperator {
                    field: path.to_owned(),
                    field_type: "status",
                    operator,
                }),
            };
        }

        if path.contains('.') {
            return Ok(());
        }

        match self.field(path) {
            Some(definition) if !definition.field_type.supports(operator) => {
                Err(IncompatibleOperator {
                    field: path.to_owned(),
                    field_type: definition.field_type.as_str(),
                    operator,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn validate_value(
        &self,
        definition: &FieldDefinition,
        value: &FieldValue,
    ) -> Result<(), ValidationIssue> {
        if value.is_null() {
            return if definition.required {
                Err(ValidationIssue::MissingRequired { field: definition.key.clone() })
            } else {
                Ok(())
            };
        }

        if !definition.field_type.accepts(value) {
            return Err(ValidationIssue::TypeMismatch {
                field: definition.key.clone(),
                expected: definition.field_type,
                found: value.type_name().to_owned(),
            });
        }

        let rejected_choice = match (definition.field_type, value) {
            (FieldType::Choice, FieldValue::String(choice)) if !definition.choices.is_empty() => {
                (!definition.allows_choice(choice)).then(|| choice.clone())
            }
            (FieldType::MultiChoice, FieldValue::StringList(selected))
                if !definition.choices.is_empty() =>
            {
                selected.iter().find(|choice| !definition.allows_choice(choice)).cloned()
            }
            _ => None,
        };

        match rejected_choice {
            Some(value) => Err(ValidationIssue::InvalidChoice {
                field: definition.key.clone(),
                value,
                choices: definition.choices.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn validate_data(&self, data: &FieldMap) -> Vec<ValidationIssue> {
        self.fields
            .iter()
            .filter_map(|definition| {
                let value = data.get(&definition.key).cloned().unwrap_or_default();
                self.validate_value(definition, &value).err()
            })
            .collect()
    }

    /// Structural checks on the schema itself.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.key.as_str()) {
                return Err(SchemaError::DuplicateField(field.key.clone()));
            }
            if field.field_type == FieldType::Choice && field.choices.is_empty() {
                return Err(SchemaError::MissingChoices(field.key.clone()));
            }
        }

        if let (Some(priority), Some(definition)) =
            (&self.default_priority, self.field(PRIORITY_FIELD))
        {
            if !definition.choices.is_empty() && !definition.allows_choice(priority) {
                return Err(SchemaError::InvalidDefaultPriority { priority: priority.clone() });
            }
        }

        self.status_workflow.validate()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::context::WorkspaceId;
    use crate::errors::SchemaError;
    use crate::rules::Operator;
    use crate::value::{FieldMap, FieldValue};

    use super::{
        ContextSchema, FieldDefinition, FieldType, StatusTransition, StatusWorkflow,
        ValidationIssue,
    };

    pub(crate) fn support_schema() -> ContextSchema {
        ContextSchema::new(WorkspaceId("ws-acme".to_owned()))
            .with_field(
                FieldDefinition::new("priority", FieldType::Choice)
                    .with_choices(["low", "medium", "high", "urgent"]),
            )
            .with_field(
                FieldDefinition::new("customer_tier", FieldType::Choice)
                    .with_choices(["standard", "gold", "platinum"]),
            )
            .with_field(FieldDefinition::new("customer_email", FieldType::Email))
            .with_field(FieldDefinition::new("order_total", FieldType::Number))
            .with_field(FieldDefinition::new("subject", FieldType::Text).required())
            .with_field(FieldDefinition::new("due_date", FieldType::DateTime))
            .with_field(FieldDefinition::new("tags", FieldType::MultiChoice).with_choices([
                "billing",
                "shipping",
                "refund",
            ]))
            .with_field(FieldDefinition::new("escalated", FieldType::Boolean))
            .with_default_priority("medium")
    }

    #[test]
    fn operator_compatibility_follows_field_type() {
        let schema = support_schema();

        assert!(schema.check_operator("order_total", Operator::GreaterThan).is_ok());
        assert!(schema.check_operator("due_date", Operator::IsBefore).is_ok());
        assert!(schema.check_operator("subject", Operator::Contains).is_ok());
        assert!(schema.check_operator("undeclared", Operator::IsAfter).is_ok());

        let error = schema.check_operator("escalated", Operator::GreaterThan).expect_err("bool");
        assert_eq!(
            error.to_string(),
            "operator `greater_than` cannot be applied to boolean field `escalated`"
        );
        assert!(schema.check_operator("order_total", Operator::Contains).is_err());
        assert!(schema.check_operator("status", Operator::LessThan).is_err());
    }

    #[test]
    fn data_validation_reports_required_type_and_choice_issues() {
        let schema = support_schema();
        let mut data = FieldMap::new();
        data.insert("priority".to_owned(), FieldValue::from("critical"));
        data.insert("order_total".to_owned(), FieldValue::from("a lot"));
        data.insert(
            "tags".to_owned(),
            FieldValue::StringList(vec!["billing".to_owned(), "legal".to_owned()]),
        );

        let issues = schema.validate_data(&data);
        let fields: Vec<&str> = issues.iter().map(ValidationIssue::field).collect();
        assert_eq!(fields, vec!["priority", "order_total", "subject", "tags"]);
        assert!(matches!(
            issues[0],
            ValidationIssue::InvalidChoice { ref value, .. } if value == "critical"
        ));
        assert!(matches!(issues[2], ValidationIssue::MissingRequired { .. }));
    }

    #[test]
    fn workflow_validation_rejects_unknown_endpoints() {
        let mut workflow = StatusWorkflow::default();
        assert!(workflow.validate().is_ok());
        assert!(workflow.transition("open", "resolved").is_some());
        assert!(workflow.transition("resolved", "in_progress").is_none());

        workflow.transitions.push(StatusTransition {
            from: "resolved".to_owned(),
            to: "archived".to_owned(),
            label: "Archive".to_owned(),
        });
        assert_eq!(
            workflow.validate(),
            Err(SchemaError::UnknownTransitionStatus {
                label: "Archive".to_owned(),
                status: "archived".to_owned(),
            })
        );
    }

    #[test]
    fn schema_validation_checks_default_priority_and_duplicates() {
        let schema = support_schema();
        assert!(schema.validate().is_ok());

        let bad_priority = support_schema().with_default_priority("p0");
        assert_eq!(
            bad_priority.validate(),
            Err(SchemaError::InvalidDefaultPriority { priority: "p0".to_owned() })
        );

        let duplicate =
            support_schema().with_field(FieldDefinition::new("subject", FieldType::LongText));
        assert_eq!(duplicate.validate(), Err(SchemaError::DuplicateField("subject".to_owned())));
    }
}
