use std::path::Path;

use caserules_core::config::{AppConfig, LoadOptions};
use caserules_core::lint::{self, LintIssue, LintSeverity};
use caserules_core::schema::ContextSchema;
use serde::Serialize;

use crate::commands::input::{read_document, read_rules};
use crate::commands::CommandResult;

const COMMAND: &str = "lint";

#[derive(Debug, Serialize)]
struct LintReport {
    rule_count: usize,
    error_count: usize,
    warning_count: usize,
    issues: Vec<LintIssue>,
}

/// Exit codes: 0 no error-severity issues, 1 errors found, 2 config, 3 unusable input.
pub fn run(options: LoadOptions, schema_path: &Path, rules_path: &Path) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    // Schema problems are reported as issues rather than refusing to lint.
    let loaded = read_document::<ContextSchema>(schema_path).and_then(|schema| {
        let rules = read_rules(rules_path, &schema)?;
        Ok((schema, rules))
    });
    let (schema, rules) = match loaded {
        Ok(loaded) => loaded,
        Err(error) => return CommandResult::failure(COMMAND, "input", format!("{error:#}"), 3),
    };

    let mut issues = lint::lint_schema(&schema);
    issues.extend(lint::lint_rules(&schema, &rules.rules, config.engine.max_workflow_depth));

    let has_errors = lint::has_errors(&issues);
    let error_count =
        issues.iter().filter(|issue| issue.severity == LintSeverity::Error).count();
    let report = LintReport {
        rule_count: rules.rules.len(),
        error_count,
        warning_count: issues.len() - error_count,
        issues,
    };

    if has_errors {
        CommandResult::report(COMMAND, "issues_found", report, 1)
    } else {
        CommandResult::report(COMMAND, "ok", report, 0)
    }
}
