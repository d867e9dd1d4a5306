pub mod audit;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod lint;
pub mod rules;
pub mod schema;
pub mod timeexpr;
pub mod value;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink};
pub use cache::{RuleSetCache, TtlCache};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use context::{Context, ContextId, ContextSnapshot, WorkspaceId};
pub use dispatch::{ActionDispatcher, ActionRequest, DispatchError, InMemoryDispatcher};
pub use engine::{EvaluationResult, ExecutedAction, RuleEngine, RuleOutcome};
pub use errors::{ErrorLocation, RuleError, SchemaError, TransitionError};
pub use extract::{ExtractedField, FieldExtractor};
pub use lint::{lint_rules, lint_schema, LintIssue, LintSeverity};
pub use rules::{
    Action, Condition, Operator, Rule, RuleId, RuleSet, TriggerKind, TriggerParseError,
};
pub use schema::{ContextSchema, FieldDefinition, FieldType, StatusWorkflow};
pub use value::{FieldMap, FieldValue};
