use std::env;
use std::fs;
use std::path::Path;

use caserules_core::config::{resolve_config_path, AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

const COMMAND: &str = "config";

struct ConfigLine {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    precedence: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

/// Exit codes: 0 loaded, 2 config failed to load or validate.
pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = [
        ConfigLine {
            key: "engine.max_workflow_depth",
            value: config.engine.max_workflow_depth.to_string(),
            env_keys: &["CASERULES_ENGINE_MAX_WORKFLOW_DEPTH"],
        },
        ConfigLine {
            key: "engine.default_trigger",
            value: config.engine.default_trigger.as_str().to_string(),
            env_keys: &["CASERULES_ENGINE_DEFAULT_TRIGGER"],
        },
        ConfigLine {
            key: "cache.ttl_secs",
            value: config.cache.ttl_secs.to_string(),
            env_keys: &["CASERULES_CACHE_TTL_SECS"],
        },
        ConfigLine {
            key: "cache.max_entries",
            value: config.cache.max_entries.to_string(),
            env_keys: &["CASERULES_CACHE_MAX_ENTRIES"],
        },
        ConfigLine {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["CASERULES_LOGGING_LEVEL", "CASERULES_LOG_LEVEL"],
        },
        ConfigLine {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["CASERULES_LOGGING_FORMAT", "CASERULES_LOG_FORMAT"],
        },
    ];

    let entries = entries
        .into_iter()
        .map(|entry| ConfigEntry {
            key: entry.key,
            source: field_source(
                entry.key,
                entry.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
            value: entry.value,
        })
        .collect();
    let report = ConfigReport {
        precedence: "env > file > default",
        config_file: config_file_path.map(|path| path.display().to_string()),
        entries,
    };
    CommandResult::report(COMMAND, "ok", report, 0)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
