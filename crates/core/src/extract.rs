//! Heuristic extraction of declared context fields from free text such as an
//! inbound email or chat transcript.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Context;
use crate::schema::{ContextSchema, FieldDefinition, FieldType};
use crate::value::{parse_timestamp, FieldValue};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub field: String,
    pub value: FieldValue,
    /// Slice of the source text the value was read from.
    pub snippet: String,
}

pub struct FieldExtractor {
    email: Regex,
    phone: Regex,
    url: Regex,
    number: Regex,
    iso_date: Regex,
}

impl FieldExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")?,
            phone: Regex::new(r"\+?\d[\d ().-]{6,}\d")?,
            url: Regex::new(r#"(?i)\bhttps?://[^\s<>"')]+"#)?,
            number: Regex::new(r"-?\d[\d,]*(?:\.\d+)?")?,
            iso_date: Regex::new(
                r"\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:\d{2})?)?",
            )?,
        })
    }

    /// One entry per declared field a value could be found for, in schema order.
    pub fn extract(&self, schema: &ContextSchema, text: &str) -> Vec<ExtractedField> {
        let lower = text.to_ascii_lowercase();
        let mut claimed = HashSet::new();
        let mut extracted = Vec::new();

        for definition in &schema.fields {
            let window = labelled_window(text, &lower, definition);
            let found = match definition.field_type {
                FieldType::Email => self.pattern(&self.email, text, window, &mut claimed),
                FieldType::Phone => self.pattern(&self.phone, text, window, &mut claimed),
                FieldType::Url => self.pattern(&self.url, text, window, &mut claimed),
                FieldType::Number => window.and_then(|window| self.number(window)),
                FieldType::Date | FieldType::DateTime => {
                    window.and_then(|window| self.timestamp(window))
                }
                FieldType::Boolean => window.and_then(boolean),
                FieldType::Choice => choice(definition, text, &lower, window),
                FieldType::MultiChoice => multi_choice(definition, text, &lower),
                FieldType::Text | FieldType::LongText => window
                    .map(str::trim)
                    .filter(|window| !window.is_empty())
                    .map(|window| (FieldValue::from(window), window.to_owned())),
            };

            if let Some((value, snippet)) = found {
                debug!(
                    event_name = "extract.field.found",
                    workspace_id = %schema.workspace_id,
                    field = %definition.key,
                    "extracted context field"
                );
                extracted.push(ExtractedField { field: definition.key.clone(), value, snippet });
            }
        }

        extracted
    }

    fn pattern(
        &self,
        regex: &Regex,
        text: &str,
        window: Option<&str>,
        claimed: &mut HashSet<String>,
    ) -> Option<(FieldValue, String)> {
        let labelled = window.and_then(|window| regex.find(window));
        let found = labelled.or_else(|| {
            regex.find_iter(text).find(|candidate| !claimed.contains(candidate.as_str()))
        })?;

        let raw = found.as_str().trim().to_owned();
        claimed.insert(raw.clone());
        Some((FieldValue::from(raw.as_str()), raw))
    }

    fn number(&self, window: &str) -> Option<(FieldValue, String)> {
        let found = self.number.find(window)?;
        let parsed = found.as_str().replace(',', "").parse::<f64>().ok()?;
        Some((FieldValue::Number(parsed), found.as_str().to_owned()))
    }

    fn timestamp(&self, window: &str) -> Option<(FieldValue, String)> {
        let found = self.iso_date.find(window)?.as_str();
        let instant = parse_timestamp(found).or_else(|| parse_timestamp(found.get(..10)?))?;
        Some((FieldValue::Timestamp(instant), found.to_owned()))
    }
}

/// Text after `label:`, `label =` or `label is` up to the end of the line.
fn labelled_window<'t>(
    text: &'t str,
    lower: &str,
    definition: &FieldDefinition,
) -> Option<&'t str> {
    let labels = [
        definition.label.to_ascii_lowercase(),
        definition.key.replace('_', " "),
        definition.key.clone(),
    ];

    for label in labels.iter().filter(|label| !label.is_empty()) {
        for (start, _) in lower.match_indices(label.as_str()) {
            if !at_word_boundary(lower, start, label.len()) {
                continue;
            }
            let rest = &lower[start + label.len()..];
            let trimmed = rest.trim_start_matches([' ', '\t']);
            let Some(separator) =
                [":", "=", "is "].into_iter().find(|separator| trimmed.starts_with(separator))
            else {
                continue;
            };

            let value_start = text.len() - trimmed.len() + separator.len();
            let line = &text[value_start..];
            let end = line.find(['\n', '\r']).unwrap_or(line.len());
            return Some(&line[..end]);
        }
    }
    None
}

fn at_word_boundary(lower: &str, start: usize, len: usize) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let before = lower[..start].chars().next_back().map_or(true, |c| !is_word(c));
    let after = lower[start + len..].chars().next().map_or(true, |c| !is_word(c));
    before && after
}

fn find_word(lower: &str, word: &str) -> Option<usize> {
    lower
        .match_indices(word)
        .map(|(start, _)| start)
        .find(|start| at_word_boundary(lower, *start, word.len()))
}

fn boolean(window: &str) -> Option<(FieldValue, String)> {
    let word = window.split_whitespace().next()?;
    let cleaned = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let value = FieldValue::from(cleaned).as_bool()?;
    Some((FieldValue::Bool(value), word.to_owned()))
}

/// Earliest whole-word occurrence of each choice in `lower`, with underscores
/// matching spaces.
fn choice_positions<'d>(
    definition: &'d FieldDefinition,
    lower: &str,
) -> Vec<(usize, usize, &'d str)> {
    definition
        .choices
        .iter()
        .filter_map(|choice| {
            let needle = choice.to_ascii_lowercase();
            let spaced = needle.replace('_', " ");
            [needle, spaced]
                .into_iter()
                .filter_map(|candidate| {
                    find_word(lower, &candidate).map(|start| (start, candidate.len()))
                })
                .min()
                .map(|(start, len)| (start, len, choice.as_str()))
        })
        .collect()
}

fn choice(
    definition: &FieldDefinition,
    text: &str,
    lower: &str,
    window: Option<&str>,
) -> Option<(FieldValue, String)> {
    if let Some(window) = window {
        let window_lower = window.to_ascii_lowercase();
        if let Some((start, len, choice)) =
            choice_positions(definition, &window_lower).into_iter().min()
        {
            return Some((FieldValue::from(choice), window[start..start + len].to_owned()));
        }
    }

    let (start, len, choice) = choice_positions(definition, lower).into_iter().min()?;
    Some((FieldValue::from(choice), text[start..start + len].to_owned()))
}

fn multi_choice(
    definition: &FieldDefinition,
    text: &str,
    lower: &str,
) -> Option<(FieldValue, String)> {
    let found = choice_positions(definition, lower);
    if found.is_empty() {
        return None;
    }

    let selected: Vec<String> = found.iter().map(|(_, _, choice)| (*choice).to_owned()).collect();
    let snippet: Vec<&str> =
        found.iter().map(|(start, len, _)| &text[*start..start + len]).collect();
    Some((FieldValue::StringList(selected), snippet.join(", ")))
}

/// Copies extracted values into fields the context has no value for yet.
/// Returns the keys that were written.
pub fn apply(extracted: &[ExtractedField], context: &mut Context) -> Vec<String> {
    let mut applied = Vec::new();
    for field in extracted {
        if context.resolve(&field.field).is_some() {
            continue;
        }
        if context.set_field(&field.field, field.value.clone()).is_ok() {
            applied.push(field.field.clone());
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::context::{Context, ContextId};
    use crate::schema::tests::support_schema;
    use crate::value::FieldValue;

    use super::{apply, ExtractedField, FieldExtractor};

    const MESSAGE: &str = "Subject: Refund for damaged blender\n\
        Customer email: jane.doe@example.com\n\
        Order total: $1,249.50\n\
        Due date: 2026-10-21\n\
        This is urgent, the customer is on the Platinum plan. Needs a refund and new shipping.\n\
        Escalated: yes\n";

    fn value_of<'a>(fields: &'a [ExtractedField], key: &str) -> Option<&'a FieldValue> {
        fields.iter().find(|field| field.field == key).map(|field| &field.value)
    }

    #[test]
    fn extracts_declared_fields_by_type() {
        let extractor = FieldExtractor::new().expect("patterns compile");
        let schema = support_schema();

        let fields = extractor.extract(&schema, MESSAGE);

        assert_eq!(
            value_of(&fields, "subject"),
            Some(&FieldValue::from("Refund for damaged blender"))
        );
        assert_eq!(
            value_of(&fields, "customer_email"),
            Some(&FieldValue::from("jane.doe@example.com"))
        );
        assert_eq!(value_of(&fields, "order_total"), Some(&FieldValue::Number(1249.5)));
        assert_eq!(
            value_of(&fields, "due_date"),
            Some(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2026, 10, 21, 0, 0, 0).single().expect("valid date")
            ))
        );
        assert_eq!(value_of(&fields, "priority"), Some(&FieldValue::from("urgent")));
        assert_eq!(value_of(&fields, "customer_tier"), Some(&FieldValue::from("platinum")));
        assert_eq!(
            value_of(&fields, "tags"),
            Some(&FieldValue::StringList(vec!["shipping".to_owned(), "refund".to_owned()]))
        );
        assert_eq!(value_of(&fields, "escalated"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn unlabelled_numbers_and_choices_inside_words_are_ignored() {
        let extractor = FieldExtractor::new().expect("patterns compile");
        let schema = support_schema();

        let fields = extractor.extract(&schema, "We ship 40 lowercase highlights to goldsmiths.");

        assert!(value_of(&fields, "order_total").is_none());
        assert!(value_of(&fields, "priority").is_none());
        assert!(value_of(&fields, "customer_tier").is_none());
    }

    #[test]
    fn apply_fills_only_missing_fields() {
        let extractor = FieldExtractor::new().expect("patterns compile");
        let schema = support_schema();
        let mut context = Context::new(ContextId("ctx-9".to_owned()), &schema)
            .with_field("subject", "Existing subject");

        let fields = extractor.extract(&schema, MESSAGE);
        let applied = apply(&fields, &mut context);

        assert!(!applied.contains(&"subject".to_owned()));
        assert!(!applied.contains(&"priority".to_owned()), "default priority is kept");
        assert!(applied.contains(&"customer_email".to_owned()));
        assert_eq!(context.resolve("subject"), Some(FieldValue::from("Existing subject")));
        assert_eq!(context.resolve("priority"), Some(FieldValue::from("medium")));
        assert_eq!(context.resolve("order_total"), Some(FieldValue::Number(1249.5)));
        assert!(context.validate(&schema).is_empty());
    }
}
