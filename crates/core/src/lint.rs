//! Static checks over rule definitions, run when rules are saved and by the
//! `lint` command. The evaluator never relies on these passing.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::ErrorLocation;
use crate::rules::{Action, Condition, Operator, Rule, RuleId};
use crate::schema::{ContextSchema, FieldType, STATUS_FIELD};
use crate::timeexpr;
use crate::value::FieldValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintSeverity {
    /// Suspicious but evaluable, such as an unreachable status target.
    Warning,
    /// The rule would record an error every time it is evaluated.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub rule_name: String,
    pub severity: LintSeverity,
    pub location: ErrorLocation,
    pub message: String,
}

pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues.iter().any(|issue| issue.severity == LintSeverity::Error)
}

/// Schema problems surfaced in lint output, before any rule is inspected.
pub fn lint_schema(schema: &ContextSchema) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    if let Err(error) = schema.validate() {
        issues.push(LintIssue {
            rule_id: None,
            rule_name: String::new(),
            severity: LintSeverity::Error,
            location: ErrorLocation::Rule,
            message: format!("schema `{}`: {error}", schema.workspace_id),
        });
    }
    issues
}

pub fn lint_rules(
    schema: &ContextSchema,
    rules: &[Rule],
    max_workflow_depth: usize,
) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let mut seen_ids = HashSet::new();

    for rule in rules {
        let mut linter = RuleLinter { schema, rule, issues: &mut issues };

        if !seen_ids.insert(rule.id.0.as_str()) {
            linter.push(
                LintSeverity::Error,
                ErrorLocation::Rule,
                format!("rule id `{}` is used more than once", rule.id),
            );
        }
        if rule.name.trim().is_empty() {
            linter.push(LintSeverity::Warning, ErrorLocation::Rule, "rule has no name");
        }
        if rule.actions.is_empty() {
            linter.push(LintSeverity::Warning, ErrorLocation::Rule, "rule has no actions");
        }

        for (index, condition) in rule.conditions.iter().enumerate() {
            linter.condition(index, condition);
        }
        linter.actions(&rule.actions, None, 0, max_workflow_depth);
    }

    issues
}

struct RuleLinter<'a> {
    schema: &'a ContextSchema,
    rule: &'a Rule,
    issues: &'a mut Vec<LintIssue>,
}

impl RuleLinter<'_> {
    fn push(
        &mut self,
        severity: LintSeverity,
        location: ErrorLocation,
        message: impl Into<String>,
    ) {
        self.issues.push(LintIssue {
            rule_id: Some(self.rule.id.clone()),
            rule_name: self.rule.name.clone(),
            severity,
            location,
            message: message.into(),
        });
    }

    fn condition(&mut self, index: usize, condition: &Condition) {
        let location = ErrorLocation::condition(index, &condition.field);

        if let Err(error) = self.schema.check_operator(&condition.field, condition.operator) {
            self.push(LintSeverity::Error, location, error.to_string());
            return;
        }

        let value = &condition.value;
        match condition.operator {
            Operator::IsBefore | Operator::IsAfter => {
                if let Err(error) = timeexpr::resolve_value(value, Utc::now()) {
                    self.push(LintSeverity::Error, location, error.to_string());
                }
            }
            Operator::GreaterThan | Operator::LessThan => {
                let temporal = self
                    .schema
                    .field(&condition.field)
                    .is_some_and(|definition| definition.field_type.is_temporal());
                let comparable = value.as_number().is_some()
                    || (temporal && timeexpr::resolve_value(value, Utc::now()).is_ok());
                if !comparable {
                    self.push(
                        LintSeverity::Error,
                        location,
                        format!(
                            "`{}` needs a numeric or time comparison value",
                            condition.operator
                        ),
                    );
                }
            }
            Operator::Contains if value.as_str().is_none() => {
                self.push(
                    LintSeverity::Error,
                    location,
                    "`contains` needs a text comparison value",
                );
            }
            Operator::Equals | Operator::NotEquals | Operator::ChangesTo => {
                if value.is_null() {
                    self.push(
                        LintSeverity::Warning,
                        location,
                        "comparison value is null; missing fields never equal it",
                    );
                } else if condition.field == STATUS_FIELD {
                    self.status_target(location, value);
                } else if let Some(definition) = self
                    .schema
                    .field(&condition.field)
                    .filter(|definition| definition.field_type == FieldType::Choice)
                {
                    // A choice that can never be stored makes the condition dead.
                    if let Err(issue) = self.schema.validate_value(definition, value) {
                        self.push(LintSeverity::Warning, location, issue.message());
                    }
                }
            }
            Operator::Contains => {}
        }
    }

    fn actions(
        &mut self,
        actions: &[Action],
        parent: Option<&str>,
        depth: usize,
        max_depth: usize,
    ) {
        for (index, action) in actions.iter().enumerate() {
            let path = match parent {
                Some(parent) => format!("{parent}.{index}"),
                None => index.to_string(),
            };
            let location = ErrorLocation::action(&path, action.kind());

            match action {
                Action::Workflow(workflow) => {
                    if depth >= max_depth {
                        self.push(
                            LintSeverity::Error,
                            location,
                            format!("workflow nesting exceeds the maximum depth of {max_depth}"),
                        );
                        continue;
                    }
                    if workflow.actions.is_empty() {
                        self.push(LintSeverity::Warning, location, "workflow has no sub-actions");
                    }
                    self.actions(&workflow.actions, Some(&path), depth + 1, max_depth);
                }
                Action::UpdateField(config) => {
                    if config.field == STATUS_FIELD {
                        self.status_target(location, &config.value);
                        continue;
                    }
                    let Some(definition) = self.schema.field(&config.field) else {
                        self.push(
                            LintSeverity::Error,
                            location,
                            format!(
                                "field `{}` is not declared in the workspace schema",
                                config.field
                            ),
                        );
                        continue;
                    };
                    let relative_time = definition.field_type.is_temporal()
                        && config.value.as_str().is_some_and(timeexpr::is_relative);
                    if relative_time {
                        if let Err(error) = timeexpr::resolve_value(&config.value, Utc::now()) {
                            self.push(LintSeverity::Error, location, error.to_string());
                        }
                    } else if !config.field.contains('.') {
                        if let Err(issue) = self.schema.validate_value(definition, &config.value) {
                            self.push(LintSeverity::Error, location, issue.message());
                        }
                    }
                }
                Action::SendNotification(config) => {
                    if config.message.trim().is_empty() {
                        self.push(
                            LintSeverity::Warning,
                            location.clone(),
                            "notification message is empty",
                        );
                    }
                    let subject = config.subject.as_ref();
                    for template in std::iter::once(&config.message).chain(subject) {
                        self.template(location.clone(), template);
                    }
                }
                Action::ScheduleFollowUp(config) => {
                    if let Err(error) = timeexpr::resolve(&config.due, Utc::now()) {
                        self.push(LintSeverity::Error, location.clone(), error.to_string());
                    }
                    self.template(location, &config.message);
                }
            }
        }
    }

    fn status_target(&mut self, location: ErrorLocation, value: &FieldValue) {
        let workflow = &self.schema.status_workflow;
        match value.as_str() {
            None => self.push(LintSeverity::Error, location, "status value must be text"),
            Some(status) if !workflow.has_status(status) => self.push(
                LintSeverity::Error,
                location,
                format!("status `{status}` is not part of the workflow"),
            ),
            Some(status) if !workflow.is_reachable(status) => self.push(
                LintSeverity::Warning,
                location,
                format!("status `{status}` cannot be reached by any declared transition"),
            ),
            Some(_) => {}
        }
    }

    fn template(&mut self, location: ErrorLocation, template: &str) {
        let mut tera = tera::Tera::default();
        if let Err(error) = tera.add_raw_template("lint", template) {
            self.push(LintSeverity::Error, location, format!("invalid template: {error}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ErrorLocation;
    use crate::rules::{Action, Condition, Operator, Rule};
    use crate::schema::tests::support_schema;
    use crate::schema::{StatusDefinition, StatusWorkflow};

    use super::{has_errors, lint_rules, lint_schema, LintSeverity};

    #[test]
    fn clean_rules_produce_no_issues() {
        let schema = support_schema();
        let rules = vec![Rule::new("urgent", "Urgent alert")
            .with_condition(Condition::equals("priority", "urgent"))
            .with_condition(Condition::new("due_date", Operator::IsBefore, "24_hours_from_now"))
            .with_action(Action::notify("Case {{ context_id }} is urgent"))
            .with_action(Action::update_field("status", "in_progress"))
            .with_action(Action::follow_up("2_hours_from_now", "Check on {{ subject }}"))];

        assert_eq!(lint_rules(&schema, &rules, 8), Vec::new());
        assert!(lint_schema(&schema).is_empty());
    }

    #[test]
    fn flags_operator_and_value_problems() {
        let schema = support_schema();
        let rules = vec![Rule::new("bad", "Bad conditions")
            .with_condition(Condition::new("escalated", Operator::Contains, "x"))
            .with_condition(Condition::new("order_total", Operator::GreaterThan, "lots"))
            .with_condition(Condition::new("due_date", Operator::IsAfter, "next_week"))
            .with_condition(Condition::new("status", Operator::Contains, "open"))
            .with_action(Action::notify("ok"))];

        let issues = lint_rules(&schema, &rules, 8);

        let indexes: Vec<usize> = issues
            .iter()
            .filter_map(|issue| match issue.location {
                ErrorLocation::Condition { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        assert!(issues.iter().all(|issue| issue.severity == LintSeverity::Error));
    }

    #[test]
    fn flags_action_problems_with_paths() {
        let schema = support_schema();
        let rules = vec![Rule::new("actions", "Bad actions")
            .with_action(Action::update_field("nonexistent", "x"))
            .with_action(Action::update_field("priority", "critical"))
            .with_action(Action::workflow(vec![
                Action::update_field("status", "archived"),
                Action::notify("Hello {{ subject"),
                Action::follow_up("whenever", "later"),
            ]))];

        let issues = lint_rules(&schema, &rules, 8);

        let paths: Vec<String> = issues
            .iter()
            .filter_map(|issue| match &issue.location {
                ErrorLocation::Action { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["0", "1", "2.0", "2.1", "2.2"]);
        assert!(has_errors(&issues));
    }

    #[test]
    fn flags_depth_duplicates_and_unreachable_status() {
        let mut schema = support_schema();
        schema.status_workflow = StatusWorkflow {
            statuses: vec![
                StatusDefinition { key: "open".to_owned(), label: "Open".to_owned() },
                StatusDefinition { key: "parked".to_owned(), label: "Parked".to_owned() },
            ],
            transitions: Vec::new(),
            default_status: "open".to_owned(),
        };
        let nested = Action::workflow(vec![Action::workflow(vec![Action::notify("deep")])]);
        let rules = vec![
            Rule::new("dup", "First").with_action(nested),
            Rule::new("dup", " ").with_action(Action::update_field("status", "parked")),
        ];

        let issues = lint_rules(&schema, &rules, 1);
        let messages: Vec<&str> = issues.iter().map(|issue| issue.message.as_str()).collect();

        assert_eq!(issues.len(), 4, "{messages:?}");
        assert!(messages.iter().any(|message| message.contains("maximum depth of 1")));
        assert!(messages.iter().any(|message| message.contains("used more than once")));
        assert!(messages.iter().any(|message| message.contains("no name")));
        assert!(messages.iter().any(|message| message.contains("cannot be reached")));
    }

    #[test]
    fn invalid_schema_is_reported() {
        let mut schema = support_schema();
        schema.status_workflow.default_status = "triage".to_owned();

        let issues = lint_schema(&schema);

        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("triage"));
    }
}
