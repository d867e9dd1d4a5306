use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use caserules_core::context::{Context, ContextId, ContextSnapshot};
use caserules_core::rules::{Rule, RuleSet};
use caserules_core::schema::ContextSchema;
use caserules_core::value::FieldMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Reads a JSON document, or TOML when the file ends in `.toml`.
pub fn read_document<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;

    let is_toml = path.extension().is_some_and(|extension| extension == "toml");
    if is_toml {
        toml::from_str(&raw).with_context(|| format!("could not parse TOML `{}`", path.display()))
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse JSON `{}`", path.display()))
    }
}

pub fn read_schema(path: &Path) -> Result<ContextSchema> {
    let schema: ContextSchema = read_document(path)?;
    schema
        .validate()
        .with_context(|| format!("schema `{}` is invalid", path.display()))?;
    Ok(schema)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RulesDocument {
    Set(RuleSet),
    List(Vec<Rule>),
}

/// A rule file holds a full rule set or a bare list of rules for the schema's workspace.
pub fn read_rules(path: &Path, schema: &ContextSchema) -> Result<RuleSet> {
    let rules = match read_document::<RulesDocument>(path)? {
        RulesDocument::Set(set) => set,
        RulesDocument::List(rules) => RuleSet::new(schema.workspace_id.clone(), rules),
    };

    if rules.workspace_id != schema.workspace_id {
        bail!(
            "rule set belongs to workspace `{}` but the schema is for `{}`",
            rules.workspace_id,
            schema.workspace_id
        );
    }
    Ok(rules)
}

#[derive(Debug, Deserialize)]
struct ContextDocument {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: FieldMap,
    #[serde(default)]
    previous: Option<ContextSnapshot>,
}

/// Builds a context from schema defaults with the file's values laid over them.
pub fn read_context(path: &Path, schema: &ContextSchema) -> Result<Context> {
    let document: ContextDocument = read_document(path)?;

    let mut context = Context::new(ContextId(document.id), schema);
    if let Some(status) = document.status {
        if !schema.status_workflow.has_status(&status) {
            bail!("context status `{status}` is not part of the workflow");
        }
        context.status = status;
    }
    context.data.extend(document.data);
    context.previous = document.previous;
    Ok(context)
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read `{}`", path.display()))
}
