use std::path::PathBuf;

use caserules_core::config::{AppConfig, LoadOptions};
use caserules_core::context::Context;
use caserules_core::dispatch::{ActionRequest, InMemoryDispatcher};
use caserules_core::engine::{EvaluationResult, RuleEngine};
use caserules_core::rules::TriggerKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::commands::input::{read_context, read_rules, read_schema};
use crate::commands::CommandResult;

const COMMAND: &str = "evaluate";

#[derive(Debug, Clone)]
pub struct EvaluateArgs {
    pub options: LoadOptions,
    pub schema: PathBuf,
    pub rules: PathBuf,
    pub context: PathBuf,
    pub trigger: Option<String>,
    pub now: Option<String>,
}

#[derive(Debug, Serialize)]
struct EvaluateReport {
    trigger: TriggerKind,
    result: EvaluationResult,
    context: Context,
    dispatched: Vec<ActionRequest>,
}

/// Exit codes: 0 clean pass, 1 rule errors recorded, 2 config, 3 unusable input.
pub fn run(args: &EvaluateArgs) -> CommandResult {
    let config = match AppConfig::load(args.options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    let trigger = match args.trigger.as_deref().map(str::parse::<TriggerKind>).transpose() {
        Ok(trigger) => trigger.unwrap_or(config.engine.default_trigger),
        Err(error) => {
            return CommandResult::failure(COMMAND, "invalid_argument", error.to_string(), 3)
        }
    };
    let now = match args.now.as_deref().map(DateTime::parse_from_rfc3339).transpose() {
        Ok(now) => now.map_or_else(Utc::now, |now| now.with_timezone(&Utc)),
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_argument",
                format!("--now must be RFC 3339: {error}"),
                3,
            )
        }
    };

    let loaded = read_schema(&args.schema).and_then(|schema| {
        let rules = read_rules(&args.rules, &schema)?;
        let context = read_context(&args.context, &schema)?;
        Ok((schema, rules, context))
    });
    let (schema, rules, mut context) = match loaded {
        Ok(loaded) => loaded,
        Err(error) => return CommandResult::failure(COMMAND, "input", format!("{error:#}"), 3),
    };

    let engine = RuleEngine::with_config(InMemoryDispatcher::default(), config.engine);
    let result = engine.evaluate_at(&mut context, &schema, rules.eligible(trigger), now);
    info!(
        event_name = "cli.evaluate.completed",
        workspace_id = %result.workspace_id,
        context_id = %result.context_id,
        fired = result.fired_rule_ids().len(),
        "evaluation completed"
    );

    let (status, exit_code) =
        if result.has_errors() { ("completed_with_errors", 1) } else { ("ok", 0) };
    let report =
        EvaluateReport { trigger, result, context, dispatched: engine.dispatcher().drain() };
    CommandResult::report(COMMAND, status, report, exit_code)
}
