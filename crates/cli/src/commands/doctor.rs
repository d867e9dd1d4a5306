use caserules_core::config::{AppConfig, EngineConfig, LoadOptions};
use caserules_core::context::{Context, ContextId, WorkspaceId};
use caserules_core::dispatch::{ActionRequest, InMemoryDispatcher};
use caserules_core::engine::RuleEngine;
use caserules_core::extract::FieldExtractor;
use caserules_core::rules::{Action, Condition, Rule};
use caserules_core::schema::{ContextSchema, FieldDefinition, FieldType};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_engine(&config.engine));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "engine_evaluation",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }
    checks.push(check_extractor());

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Evaluates a built-in rule end to end: condition, template rendering, status
/// transition, and dispatch.
fn check_engine(config: &EngineConfig) -> DoctorCheck {
    let schema = ContextSchema::new(WorkspaceId("doctor".to_string()))
        .with_field(FieldDefinition::new("priority", FieldType::Choice).with_choices(["urgent"]));
    let mut context =
        Context::new(ContextId("doctor-1".to_string()), &schema).with_field("priority", "urgent");
    let rule = Rule::new("doctor-rule", "Doctor probe")
        .with_condition(Condition::equals("priority", "urgent"))
        .with_action(Action::update_field("status", "in_progress"))
        .with_action(Action::notify("{{ context_id }} is {{ status }}"));

    let engine = RuleEngine::with_config(InMemoryDispatcher::default(), config.clone());
    let result = engine.evaluate(&mut context, &schema, [&rule]);
    let rendered = engine.dispatcher().requests().into_iter().find_map(|request| match request {
        ActionRequest::Notification(notification) => Some(notification.message),
        ActionRequest::FollowUp(_) => None,
    });

    let first_error = result.errors().next().cloned();
    match (first_error, rendered) {
        (None, Some(message)) if message == "doctor-1 is in_progress" => DoctorCheck {
            name: "engine_evaluation",
            status: CheckStatus::Pass,
            details: format!("probe rule fired and rendered `{message}`"),
        },
        (Some(error), _) => DoctorCheck {
            name: "engine_evaluation",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
        (None, rendered) => DoctorCheck {
            name: "engine_evaluation",
            status: CheckStatus::Fail,
            details: format!("unexpected probe notification: {rendered:?}"),
        },
    }
}

fn check_extractor() -> DoctorCheck {
    match FieldExtractor::new() {
        Ok(_) => DoctorCheck {
            name: "extraction_patterns",
            status: CheckStatus::Pass,
            details: "field extraction patterns compiled".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "extraction_patterns",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
