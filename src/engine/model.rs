use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Dynamically typed variable bag shared by instances and tasks.
pub type Variables = HashMap<String, Value>;

/// A published, versioned workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    pub id: String,
    pub key: String,
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub id: String,
    pub process_definition_id: String,
    pub process_definition_key: String,
    pub business_key: Option<String>,
    pub variables: Variables,
    pub suspended: bool,
    pub ended: bool,
}

impl ProcessInstance {
    pub fn is_active(&self) -> bool {
        !self.suspended && !self.ended
    }
}

/// A unit of human work waiting on a user-task node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub execution_id: String,
    /// Id of the flow node this task was created for.
    pub task_definition_key: String,
    pub business_key: Option<String>,
    pub assignee: Option<String>,
    pub candidate_users: Vec<String>,
    pub local_variables: Variables,
    pub suspended: bool,
}

impl Task {
    pub fn is_active(&self) -> bool {
        !self.suspended
    }

    pub fn is_candidate_or_assigned(&self, user_id: &str) -> bool {
        match &self.assignee {
            Some(assignee) => assignee == user_id,
            None => self.candidate_users.iter().any(|c| c == user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricTaskInstance {
    pub id: String,
    pub name: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub task_definition_key: String,
    pub assignee: Option<String>,
    pub delete_reason: Option<String>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricActivityInstance {
    pub id: String,
    pub activity_id: String,
    pub activity_name: Option<String>,
    pub activity_type: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub execution_id: String,
    pub task_id: Option<String>,
    pub assignee: Option<String>,
    pub finished: bool,
}
