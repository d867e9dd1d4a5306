use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::EngineConfig;
use crate::context::{Context, ContextId, WorkspaceId};
use crate::dispatch::{ActionDispatcher, ActionRequest, FollowUpRequest, NotificationRequest};
use crate::errors::{ErrorLocation, RuleError};
use crate::rules::{
    sort_for_evaluation, Action, Condition, FollowUpConfig, NotificationConfig, Operator, Rule,
    RuleId, UpdateFieldConfig,
};
use crate::schema::{ContextSchema, STATUS_FIELD};
use crate::timeexpr;
use crate::value::FieldValue;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedAction {
    /// Position in the rule's action tree: `1` or `1.0` for workflow children.
    pub path: String,
    pub kind: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub fired: bool,
    pub actions_executed: Vec<ExecutedAction>,
    pub errors: Vec<RuleError>,
}

impl RuleOutcome {
    fn new(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            fired: false,
            actions_executed: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Audit trail of one evaluation pass, in evaluation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub workspace_id: WorkspaceId,
    pub context_id: ContextId,
    pub evaluated_at: DateTime<Utc>,
    pub outcomes: Vec<RuleOutcome>,
}

impl EvaluationResult {
    pub fn fired(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.fired)
    }

    pub fn fired_rule_ids(&self) -> Vec<&RuleId> {
        self.fired().map(|outcome| &outcome.rule_id).collect()
    }

    pub fn outcome(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|outcome| outcome.rule_id.0 == rule_id)
    }

    pub fn errors(&self) -> impl Iterator<Item = &RuleError> {
        self.outcomes.iter().flat_map(|outcome| outcome.errors.iter())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// Evaluates a workspace's rules against one context at a time.
///
/// The engine holds no per-context state, so one instance may serve parallel
/// evaluations of different contexts. Callers serialize evaluations of the
/// same context.
pub struct RuleEngine<D> {
    dispatcher: D,
    config: EngineConfig,
}

impl<D> RuleEngine<D>
where
    D: ActionDispatcher,
{
    pub fn new(dispatcher: D) -> Self {
        Self::with_config(dispatcher, EngineConfig::default())
    }

    pub fn with_config(dispatcher: D, config: EngineConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate<'r, I>(
        &self,
        context: &mut Context,
        schema: &ContextSchema,
        rules: I,
    ) -> EvaluationResult
    where
        I: IntoIterator<Item = &'r Rule>,
    {
        self.evaluate_at(context, schema, rules, Utc::now())
    }

    /// Same as [`RuleEngine::evaluate`] with relative times resolved against `now`.
    pub fn evaluate_at<'r, I>(
        &self,
        context: &mut Context,
        schema: &ContextSchema,
        rules: I,
        now: DateTime<Utc>,
    ) -> EvaluationResult
    where
        I: IntoIterator<Item = &'r Rule>,
    {
        let mut ordered: Vec<&Rule> = rules.into_iter().filter(|rule| rule.active).collect();
        sort_for_evaluation(&mut ordered);

        let pass = Pass { engine: self, schema, now };
        let outcomes = ordered.into_iter().map(|rule| pass.run_rule(rule, context)).collect();

        EvaluationResult {
            workspace_id: context.workspace_id.clone(),
            context_id: context.id.clone(),
            evaluated_at: now,
            outcomes,
        }
    }

    pub fn evaluate_with_audit<'r, I, S>(
        &self,
        context: &mut Context,
        schema: &ContextSchema,
        rules: I,
        sink: &S,
        audit: &AuditContext,
    ) -> EvaluationResult
    where
        I: IntoIterator<Item = &'r Rule>,
        S: AuditSink,
    {
        let result = self.evaluate(context, schema, rules);
        emit_audit(&result, sink, audit);
        result
    }
}

fn emit_audit<S>(result: &EvaluationResult, sink: &S, audit: &AuditContext)
where
    S: AuditSink,
{
    for outcome in &result.outcomes {
        if outcome.fired {
            sink.emit(
                AuditEvent::new(audit, "rule.fired", AuditCategory::Rule, AuditOutcome::Success)
                    .with_metadata("rule_id", outcome.rule_id.0.clone())
                    .with_metadata("actions_executed", outcome.actions_executed.len().to_string()),
            );
        }

        for error in &outcome.errors {
            let (category, audit_outcome) = match error {
                RuleError::Transition { .. } => (AuditCategory::Workflow, AuditOutcome::Rejected),
                RuleError::Configuration { .. } => (AuditCategory::Rule, AuditOutcome::Rejected),
                RuleError::Evaluation { .. } => (AuditCategory::Action, AuditOutcome::Failed),
            };
            sink.emit(
                AuditEvent::new(audit, "rule.error_recorded", category, audit_outcome)
                    .with_metadata("rule_id", outcome.rule_id.0.clone())
                    .with_metadata("error_class", error.class())
                    .with_metadata("error", error.to_string()),
            );
        }
    }
}

struct Pass<'a, D> {
    engine: &'a RuleEngine<D>,
    schema: &'a ContextSchema,
    now: DateTime<Utc>,
}

impl<D> Pass<'_, D>
where
    D: ActionDispatcher,
{
    fn run_rule(&self, rule: &Rule, context: &mut Context) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(rule);

        for (index, condition) in rule.conditions.iter().enumerate() {
            match self.check_condition(index, condition, context) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        event_name = "rules.condition.unmatched",
                        workspace_id = %context.workspace_id,
                        context_id = %context.id,
                        rule_id = %rule.id,
                        condition_index = index,
                        field = %condition.field,
                        "rule condition did not match"
                    );
                    return outcome;
                }
                Err(error) => {
                    warn!(
                        event_name = "rules.condition.failed",
                        workspace_id = %context.workspace_id,
                        context_id = %context.id,
                        rule_id = %rule.id,
                        error = %error,
                        "rule condition could not be evaluated; treating as non-matching"
                    );
                    outcome.errors.push(error);
                    return outcome;
                }
            }
        }

        outcome.fired = true;
        info!(
            event_name = "rules.rule.fired",
            workspace_id = %context.workspace_id,
            context_id = %context.id,
            rule_id = %rule.id,
            priority = rule.priority,
            "rule fired"
        );

        self.run_actions(rule, &rule.actions, None, 0, context, &mut outcome);
        outcome
    }

    fn check_condition(
        &self,
        index: usize,
        condition: &Condition,
        context: &Context,
    ) -> Result<bool, RuleError> {
        let location = || ErrorLocation::condition(index, &condition.field);

        self.schema
            .check_operator(&condition.field, condition.operator)
            .map_err(|error| RuleError::configuration(location(), error.to_string()))?;

        let expected = &condition.value;
        let Some(current) = context.resolve(&condition.field) else {
            // Absent fields only satisfy `not_equals`.
            return Ok(condition.operator == Operator::NotEquals);
        };

        let matched = match condition.operator {
            Operator::Equals => current.loosely_equals(expected),
            Operator::NotEquals => !current.loosely_equals(expected),
            Operator::Contains => contains(&current, expected)
                .map_err(|message| RuleError::evaluation(location(), message))?,
            Operator::GreaterThan | Operator::LessThan => {
                let ordering = self
                    .order(&current, expected)
                    .map_err(|message| RuleError::evaluation(location(), message))?;
                if condition.operator == Operator::GreaterThan {
                    ordering.is_gt()
                } else {
                    ordering.is_lt()
                }
            }
            Operator::IsBefore | Operator::IsAfter => {
                let instant = current.as_timestamp().ok_or_else(|| {
                    RuleError::evaluation(
                        location(),
                        format!("{} value is not a point in time", current.type_name()),
                    )
                })?;
                let reference = timeexpr::resolve_value(expected, self.now)
                    .map_err(|error| RuleError::evaluation(location(), error.to_string()))?;
                if condition.operator == Operator::IsBefore {
                    instant < reference
                } else {
                    instant > reference
                }
            }
            Operator::ChangesTo => {
                let changed = match context.resolve_previous(&condition.field) {
                    Some(Some(previous)) => !previous.loosely_equals(expected),
                    Some(None) | None => true,
                };
                changed && current.loosely_equals(expected)
            }
        };

        Ok(matched)
    }

    fn order(
        &self,
        current: &FieldValue,
        expected: &FieldValue,
    ) -> Result<std::cmp::Ordering, String> {
        if let Some(ordering) = current.partial_order(expected) {
            return Ok(ordering);
        }

        if let (Some(instant), FieldValue::String(raw)) = (current.as_timestamp(), expected) {
            if let Ok(reference) = timeexpr::resolve(raw, self.now) {
                return Ok(instant.cmp(&reference));
            }
        }

        Err(format!(
            "cannot order {} value `{current}` against {} value `{expected}`",
            current.type_name(),
            expected.type_name()
        ))
    }

    fn run_actions(
        &self,
        rule: &Rule,
        actions: &[Action],
        parent: Option<&str>,
        depth: usize,
        context: &mut Context,
        outcome: &mut RuleOutcome,
    ) {
        for (index, action) in actions.iter().enumerate() {
            let path = match parent {
                Some(parent) => format!("{parent}.{index}"),
                None => index.to_string(),
            };
            let location = ErrorLocation::action(&path, action.kind());

            let result = match action {
                Action::Workflow(workflow) => {
                    if depth >= self.engine.config.max_workflow_depth {
                        Err(RuleError::configuration(
                            location,
                            format!(
                                "workflow nesting exceeds the maximum depth of {}",
                                self.engine.config.max_workflow_depth
                            ),
                        ))
                    } else {
                        outcome.actions_executed.push(ExecutedAction {
                            path: path.clone(),
                            kind: action.kind().to_owned(),
                            detail: format!("{} sub-action(s)", workflow.actions.len()),
                        });
                        self.run_actions(
                            rule,
                            &workflow.actions,
                            Some(&path),
                            depth + 1,
                            context,
                            outcome,
                        );
                        continue;
                    }
                }
                Action::UpdateField(config) => self.update_field(config, context, location),
                Action::SendNotification(config) => {
                    self.send_notification(rule, config, context, location)
                }
                Action::ScheduleFollowUp(config) => {
                    self.schedule_follow_up(rule, config, context, location)
                }
            };

            match result {
                Ok(detail) => outcome.actions_executed.push(ExecutedAction {
                    path,
                    kind: action.kind().to_owned(),
                    detail,
                }),
                Err(error) => {
                    warn!(
                        event_name = "rules.action.failed",
                        workspace_id = %context.workspace_id,
                        context_id = %context.id,
                        rule_id = %rule.id,
                        action_path = %path,
                        error = %error,
                        "rule action failed; continuing with remaining actions"
                    );
                    outcome.errors.push(error);
                }
            }
        }
    }

    fn update_field(
        &self,
        config: &UpdateFieldConfig,
        context: &mut Context,
        location: ErrorLocation,
    ) -> Result<String, RuleError> {
        if config.field == STATUS_FIELD {
            let Some(target) = config.value.as_str() else {
                return Err(RuleError::configuration(
                    location,
                    format!("status must be set to a text value, got {}", config.value.type_name()),
                ));
            };
            return match context.transition_status(&self.schema.status_workflow, target) {
                Ok(Some(edge)) => {
                    Ok(format!("status `{}` -> `{}` ({})", edge.from, edge.to, edge.label))
                }
                Ok(None) => Ok(format!("status already `{target}`")),
                Err(error) => Err(error.into_rule_error(location)),
            };
        }

        let Some(definition) = self.schema.field(&config.field) else {
            return Err(RuleError::configuration(
                location,
                format!("field `{}` is not declared in the workspace schema", config.field),
            ));
        };

        let value = match &config.value {
            FieldValue::String(raw)
                if definition.field_type.is_temporal() && timeexpr::is_relative(raw) =>
            {
                let instant = timeexpr::resolve(raw, self.now).map_err(|error| {
                    RuleError::configuration(location.clone(), error.to_string())
                })?;
                FieldValue::Timestamp(instant)
            }
            other => other.clone(),
        };

        if !config.field.contains('.') {
            self.schema
                .validate_value(definition, &value)
                .map_err(|issue| RuleError::configuration(location.clone(), issue.message()))?;
        }

        let detail = format!("{} = {value}", config.field);
        context
            .set_field(&config.field, value)
            .map_err(|error| RuleError::evaluation(location, error.to_string()))?;
        Ok(detail)
    }

    fn send_notification(
        &self,
        rule: &Rule,
        config: &NotificationConfig,
        context: &Context,
        location: ErrorLocation,
    ) -> Result<String, RuleError> {
        let message = render_template(&config.message, context)
            .map_err(|message| RuleError::evaluation(location.clone(), message))?;
        let subject = config
            .subject
            .as_deref()
            .map(|subject| render_template(subject, context))
            .transpose()
            .map_err(|message| RuleError::evaluation(location.clone(), message))?;

        let detail = format!(
            "{:?} notification to {} recipient(s)",
            config.channel,
            config.recipients.len()
        );
        self.engine
            .dispatcher
            .dispatch(ActionRequest::Notification(NotificationRequest {
                rule_id: rule.id.clone(),
                workspace_id: context.workspace_id.clone(),
                context_id: context.id.clone(),
                channel: config.channel,
                recipients: config.recipients.clone(),
                subject,
                message,
            }))
            .map_err(|error| RuleError::evaluation(location, error.to_string()))?;
        Ok(detail)
    }

    fn schedule_follow_up(
        &self,
        rule: &Rule,
        config: &FollowUpConfig,
        context: &Context,
        location: ErrorLocation,
    ) -> Result<String, RuleError> {
        let due_at = timeexpr::resolve(&config.due, self.now)
            .map_err(|error| RuleError::evaluation(location.clone(), error.to_string()))?;
        let message = render_template(&config.message, context)
            .map_err(|message| RuleError::evaluation(location.clone(), message))?;

        self.engine
            .dispatcher
            .dispatch(ActionRequest::FollowUp(FollowUpRequest {
                rule_id: rule.id.clone(),
                workspace_id: context.workspace_id.clone(),
                context_id: context.id.clone(),
                due_at,
                message,
                assignee: config.assignee.clone(),
            }))
            .map_err(|error| RuleError::evaluation(location, error.to_string()))?;
        Ok(format!("follow-up due {}", due_at.to_rfc3339()))
    }
}

fn contains(current: &FieldValue, expected: &FieldValue) -> Result<bool, String> {
    let Some(needle) = expected.as_str().map(str::to_lowercase) else {
        return Err(format!(
            "`contains` needs a text comparison value, got {}",
            expected.type_name()
        ));
    };

    match current {
        FieldValue::String(haystack) => Ok(haystack.to_lowercase().contains(&needle)),
        FieldValue::StringList(items) => Ok(items.iter().any(|item| item.to_lowercase() == needle)),
        other => Err(format!("`contains` cannot search a {} value", other.type_name())),
    }
}

/// Renders `{{ field }}` placeholders against the context data, `status` and `context_id`.
fn render_template(template: &str, context: &Context) -> Result<String, String> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template.to_owned());
    }

    let mut variables = tera::Context::new();
    for (key, value) in &context.data {
        variables.insert(key.as_str(), value);
    }
    variables.insert(STATUS_FIELD, &context.status);
    variables.insert("context_id", &context.id.0);

    tera::Tera::one_off(template, &variables, false)
        .map_err(|error| format!("template rendering failed: {error}"))
}
