use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::ProcessEngine;
use crate::engine::flow::FlowElement;
use crate::engine::model::{ProcessInstance, Task, Variables};

/// Request to start a process instance from the latest definition of a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartProcessModel {
    pub process_definition_key: String,
    pub business_key: Option<String>,
    /// Initiator; their first task is completed on their behalf.
    pub user_id: Option<String>,
    pub variables: Variables,
    pub candidate_or_assigned: Vec<String>,
}

impl StartProcessModel {
    pub fn new(process_definition_key: &str) -> Self {
        Self {
            process_definition_key: process_definition_key.to_string(),
            ..Self::default()
        }
    }

    pub fn business_key(mut self, business_key: &str) -> Self {
        self.business_key = Some(business_key.to_string());
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn candidate(mut self, user_id: &str) -> Self {
        self.candidate_or_assigned.push(user_id.to_string());
        self
    }
}

/// Request to complete a claimed task, optionally redirecting afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskCompleteModel {
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    /// Merged into the process instance.
    pub variables: Variables,
    /// Merged into the task only.
    pub task_variables: Variables,
    pub target_task_key: Option<String>,
    pub candidate_or_assigned: Vec<String>,
}

impl TaskCompleteModel {
    pub fn new(task_id: &str, user_id: &str) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn task_var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.task_variables.insert(key.to_string(), value.into());
        self
    }

    pub fn jump_to(mut self, target_task_key: &str) -> Self {
        self.target_task_key = Some(target_task_key.to_string());
        self
    }

    pub fn candidate(mut self, user_id: &str) -> Self {
        self.candidate_or_assigned.push(user_id.to_string());
        self
    }
}

/// Anything that can carry an acting user and a candidate override list.
pub trait CandidateSource: Send + Sync {
    fn user_id(&self) -> Option<&str>;
    fn candidate_or_assigned(&self) -> &[String];
}

impl CandidateSource for StartProcessModel {
    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn candidate_or_assigned(&self) -> &[String] {
        &self.candidate_or_assigned
    }
}

impl CandidateSource for TaskCompleteModel {
    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn candidate_or_assigned(&self) -> &[String] {
        &self.candidate_or_assigned
    }
}

/// Read-only view handed to candidate resolvers.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub engine: ProcessEngine,
    pub process_instance: Option<ProcessInstance>,
    pub task: Task,
    pub flow_element: Option<FlowElement>,
    pub current_user_id: Option<String>,
}
