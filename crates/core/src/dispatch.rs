use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextId, WorkspaceId};
use crate::rules::{NotificationChannel, RuleId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub rule_id: RuleId,
    pub workspace_id: WorkspaceId,
    pub context_id: ContextId,
    pub channel: NotificationChannel,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpRequest {
    pub rule_id: RuleId,
    pub workspace_id: WorkspaceId,
    pub context_id: ContextId,
    pub due_at: DateTime<Utc>,
    pub message: String,
    pub assignee: Option<String>,
}

/// A fully resolved side effect requested by a fired rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionRequest {
    Notification(NotificationRequest),
    FollowUp(FollowUpRequest),
}

impl ActionRequest {
    pub fn rule_id(&self) -> &RuleId {
        match self {
            Self::Notification(request) => &request.rule_id,
            Self::FollowUp(request) => &request.rule_id,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher rejected request: {0}")]
    Rejected(String),
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Hands action requests to the systems that perform them (mail, SMS,
/// scheduling). Implementations must not block on delivery.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, request: ActionRequest) -> Result<(), DispatchError>;
}

impl<T> ActionDispatcher for Arc<T>
where
    T: ActionDispatcher + ?Sized,
{
    fn dispatch(&self, request: ActionRequest) -> Result<(), DispatchError> {
        (**self).dispatch(request)
    }
}

/// Records requests for callers that persist or enqueue them after the pass.
#[derive(Clone, Default)]
pub struct InMemoryDispatcher {
    requests: Arc<Mutex<Vec<ActionRequest>>>,
}

impl InMemoryDispatcher {
    pub fn requests(&self) -> Vec<ActionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn drain(&self) -> Vec<ActionRequest> {
        match self.requests.lock() {
            Ok(mut requests) => std::mem::take(&mut *requests),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ActionDispatcher for InMemoryDispatcher {
    fn dispatch(&self, request: ActionRequest) -> Result<(), DispatchError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::context::{ContextId, WorkspaceId};
    use crate::rules::{NotificationChannel, RuleId};

    use super::{ActionDispatcher, ActionRequest, InMemoryDispatcher, NotificationRequest};

    fn notification(message: &str) -> ActionRequest {
        ActionRequest::Notification(NotificationRequest {
            rule_id: RuleId("rule-urgent".to_owned()),
            workspace_id: WorkspaceId("ws-acme".to_owned()),
            context_id: ContextId("ctx-9".to_owned()),
            channel: NotificationChannel::Email,
            recipients: vec!["ops@acme.test".to_owned()],
            subject: None,
            message: message.to_owned(),
        })
    }

    #[test]
    fn in_memory_dispatcher_records_and_drains_in_order() {
        let dispatcher = InMemoryDispatcher::default();
        let shared: Arc<dyn ActionDispatcher> = Arc::new(dispatcher.clone());

        shared.dispatch(notification("first")).expect("dispatch first");
        shared.dispatch(notification("second")).expect("dispatch second");

        let requests = dispatcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], notification("first"));
        assert_eq!(requests[1].rule_id().0, "rule-urgent");

        assert_eq!(dispatcher.drain().len(), 2);
        assert!(dispatcher.requests().is_empty());
    }
}
