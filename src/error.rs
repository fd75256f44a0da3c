use serde::Serialize;
use thiserror::Error;

use crate::query::EntityKind;

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PreconditionViolation,
    UnsupportedEntityKind,
    Configuration,
    Engine,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Process definition not found for key: {0}")]
    DefinitionNotFound(String),

    #[error("Task id is required")]
    MissingTaskId,

    #[error("User id is required")]
    MissingUserId,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Flow model not found for process definition: {0}")]
    FlowModelNotFound(String),

    #[error("Task {0} has not been claimed")]
    TaskNotClaimed(String),

    #[error("Task {task_id} is not assigned to {user_id}")]
    WrongAssignee { task_id: String, user_id: String },

    #[error("Task {0} is already claimed")]
    AlreadyClaimed(String),

    #[error("Process instance is not active: {0}")]
    InstanceNotActive(String),

    #[error("Unsupported entity kind: {0}")]
    UnsupportedEntityKind(EntityKind),

    #[error("No one-argument query method `{field}` for {kind}")]
    KeyQueryMethodNotFound { kind: EntityKind, field: String },

    #[error("No {kind} found with {field} = {key}")]
    RecordNotFound {
        kind: EntityKind,
        field: String,
        key: String,
    },

    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::DefinitionNotFound(_)
            | WorkflowError::TaskNotFound(_)
            | WorkflowError::RecordNotFound { .. } => ErrorKind::NotFound,
            WorkflowError::MissingTaskId
            | WorkflowError::MissingUserId
            | WorkflowError::TaskNotClaimed(_)
            | WorkflowError::WrongAssignee { .. }
            | WorkflowError::AlreadyClaimed(_)
            | WorkflowError::InstanceNotActive(_)
            | WorkflowError::InvalidPage(_) => ErrorKind::PreconditionViolation,
            WorkflowError::UnsupportedEntityKind(_) => ErrorKind::UnsupportedEntityKind,
            WorkflowError::FlowModelNotFound(_) | WorkflowError::KeyQueryMethodNotFound { .. } => {
                ErrorKind::Configuration
            }
            WorkflowError::Engine(_) => ErrorKind::Engine,
        }
    }
}
