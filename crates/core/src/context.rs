use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;
use crate::schema::{
    ContextSchema, StatusTransition, StatusWorkflow, ValidationIssue, PRIORITY_FIELD, STATUS_FIELD,
};
use crate::value::{self, FieldMap, FieldValue, PathError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a context before the update that triggered evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub status: String,
    #[serde(default)]
    pub data: FieldMap,
}

/// Structured business data extracted for one case or conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub workspace_id: WorkspaceId,
    pub status: String,
    #[serde(default)]
    pub data: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ContextSnapshot>,
}

impl Context {
    /// A fresh context in the schema's initial status with declared defaults applied.
    pub fn new(id: ContextId, schema: &ContextSchema) -> Self {
        let mut data = FieldMap::new();
        for field in &schema.fields {
            if let Some(default) = &field.default {
                data.insert(field.key.clone(), default.clone());
            }
        }
        if let Some(priority) = &schema.default_priority {
            if schema.field(PRIORITY_FIELD).is_some() {
                data.entry(PRIORITY_FIELD.to_owned())
                    .or_insert_with(|| FieldValue::String(priority.clone()));
            }
        }

        Self {
            id,
            workspace_id: schema.workspace_id.clone(),
            status: schema.status_workflow.default_status.clone(),
            data,
            previous: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_previous(mut self, previous: ContextSnapshot) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Freezes the current state as the baseline `changes_to` conditions compare against.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot { status: self.status.clone(), data: self.data.clone() }
    }

    /// Current value at a dot-path. `status` resolves to the workflow status;
    /// explicit nulls read as absent.
    pub fn resolve(&self, path: &str) -> Option<FieldValue> {
        if path == STATUS_FIELD {
            return Some(FieldValue::String(self.status.clone()));
        }
        value::get_path(&self.data, path).filter(|value| !value.is_null()).cloned()
    }

    /// Value at a dot-path before the triggering update, if a snapshot was recorded.
    pub fn resolve_previous(&self, path: &str) -> Option<Option<FieldValue>> {
        let previous = self.previous.as_ref()?;
        if path == STATUS_FIELD {
            return Some(Some(FieldValue::String(previous.status.clone())));
        }
        Some(value::get_path(&previous.data, path).filter(|value| !value.is_null()).cloned())
    }

    pub fn set_field(
        &mut self,
        path: &str,
        value: FieldValue,
    ) -> Result<Option<FieldValue>, PathError> {
        value::set_path(&mut self.data, path, value)
    }

    /// Moves to `to` along a declared workflow edge. Returns `None` when the
    /// context already sits in `to`; the status is untouched on error.
    pub fn transition_status(
        &mut self,
        workflow: &StatusWorkflow,
        to: &str,
    ) -> Result<Option<StatusTransition>, TransitionError> {
        if !workflow.has_status(to) {
            return Err(TransitionError::UnknownStatus {
                from: self.status.clone(),
                status: to.to_owned(),
            });
        }
        if self.status == to {
            return Ok(None);
        }

        let Some(edge) = workflow.transition(&self.status, to) else {
            return Err(TransitionError::Undeclared {
                from: self.status.clone(),
                to: to.to_owned(),
            });
        };

        self.status = edge.to.clone();
        Ok(Some(edge.clone()))
    }

    pub fn validate(&self, schema: &ContextSchema) -> Vec<ValidationIssue> {
        schema.validate_data(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TransitionError;
    use crate::schema::tests::support_schema;
    use crate::value::FieldValue;

    use super::{Context, ContextId, ContextSnapshot};

    #[test]
    fn new_context_starts_in_default_status_with_default_priority() {
        let schema = support_schema();
        let context = Context::new(ContextId("ctx-1".to_owned()), &schema);

        assert_eq!(context.status, "open");
        assert_eq!(context.workspace_id, schema.workspace_id);
        assert_eq!(context.resolve("priority"), Some(FieldValue::from("medium")));
        assert_eq!(context.resolve("status"), Some(FieldValue::from("open")));
        assert!(context.previous.is_none());
    }

    #[test]
    fn explicit_nulls_resolve_as_absent() {
        let schema = support_schema();
        let context = Context::new(ContextId("ctx-2".to_owned()), &schema)
            .with_field("subject", FieldValue::Null);

        assert_eq!(context.resolve("subject"), None);
        assert_eq!(context.resolve_previous("subject"), None);
    }

    #[test]
    fn previous_snapshot_is_exposed_per_field() {
        let schema = support_schema();
        let context = Context::new(ContextId("ctx-3".to_owned()), &schema)
            .with_field("priority", "urgent")
            .with_previous(ContextSnapshot { status: "open".to_owned(), ..Default::default() });

        assert_eq!(context.resolve_previous("priority"), Some(None));
        assert_eq!(context.resolve_previous("status"), Some(Some(FieldValue::from("open"))));
    }

    #[test]
    fn status_changes_follow_declared_edges_only() {
        let schema = support_schema();
        let mut context = Context::new(ContextId("ctx-4".to_owned()), &schema);

        let edge = context
            .transition_status(&schema.status_workflow, "in_progress")
            .expect("declared edge")
            .expect("status changed");
        assert_eq!(edge.label, "Start work");
        assert_eq!(context.status, "in_progress");

        let error = context
            .transition_status(&schema.status_workflow, "open")
            .expect_err("in_progress -> open is not declared");
        assert_eq!(
            error,
            TransitionError::Undeclared { from: "in_progress".to_owned(), to: "open".to_owned() }
        );
        assert_eq!(context.status, "in_progress");

        assert!(matches!(
            context.transition_status(&schema.status_workflow, "archived"),
            Err(TransitionError::UnknownStatus { .. })
        ));
        assert_eq!(context.transition_status(&schema.status_workflow, "in_progress"), Ok(None));
    }
}
