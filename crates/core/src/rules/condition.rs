use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    ChangesTo,
    IsBefore,
    IsAfter,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::ChangesTo => "changes_to",
            Self::IsBefore => "is_before",
            Self::IsAfter => "is_after",
        }
    }

    /// Operators whose comparison value may be a relative-time expression.
    pub fn accepts_time_expression(self) -> bool {
        matches!(self, Self::IsBefore | Self::IsAfter | Self::GreaterThan | Self::LessThan)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test against a context field. Conditions of a rule are AND-combined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: FieldValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FieldValue>) -> Self {
        Self { field: field.into(), operator, value: value.into() }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, Operator::Equals, value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::value::FieldValue;

    use super::{Condition, Operator};

    #[test]
    fn condition_decodes_from_snake_case_operator() {
        let condition: Condition = serde_json::from_value(json!({
            "field": "order_total",
            "operator": "greater_than",
            "value": 500
        }))
        .expect("decode condition");

        assert_eq!(condition, Condition::new("order_total", Operator::GreaterThan, 500_i64));
        assert_eq!(condition.operator.to_string(), "greater_than");
    }

    #[test]
    fn missing_comparison_value_defaults_to_null() {
        let condition: Condition =
            serde_json::from_value(json!({ "field": "assignee", "operator": "not_equals" }))
                .expect("decode condition");

        assert_eq!(condition.value, FieldValue::Null);
    }
}
