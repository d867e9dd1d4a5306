use std::path::Path;

use caserules_core::context::Context;
use caserules_core::extract::{self, ExtractedField, FieldExtractor};
use serde::Serialize;

use crate::commands::input::{read_context, read_schema, read_text};
use crate::commands::CommandResult;

const COMMAND: &str = "extract";

#[derive(Debug, Serialize)]
struct ExtractReport {
    fields: Vec<ExtractedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Context>,
}

pub fn run(schema_path: &Path, text_path: &Path, context_path: Option<&Path>) -> CommandResult {
    let loaded = read_schema(schema_path).and_then(|schema| {
        let text = read_text(text_path)?;
        let context = context_path.map(|path| read_context(path, &schema)).transpose()?;
        Ok((schema, text, context))
    });
    let (schema, text, context) = match loaded {
        Ok(loaded) => loaded,
        Err(error) => return CommandResult::failure(COMMAND, "input", format!("{error:#}"), 3),
    };

    let extractor = match FieldExtractor::new() {
        Ok(extractor) => extractor,
        Err(error) => return CommandResult::failure(COMMAND, "internal", error.to_string(), 1),
    };
    let fields = extractor.extract(&schema, &text);

    let report = match context {
        Some(mut context) => {
            let applied = extract::apply(&fields, &mut context);
            ExtractReport { fields, applied: Some(applied), context: Some(context) }
        }
        None => ExtractReport { fields, applied: None, context: None },
    };
    CommandResult::report(COMMAND, "ok", report, 0)
}
