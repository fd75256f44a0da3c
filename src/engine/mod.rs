//! Boundary to the process execution engine.
//!
//! The engine owns definitions, instances, tasks and history. This crate only
//! talks to it through the service traits below; `memory` provides an
//! in-process implementation.

pub mod command;
pub mod flow;
pub mod memory;
pub mod model;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::query::{
    HistoricActivityCriteria, HistoricTaskCriteria, PageWindow, ProcessDefinitionCriteria, Query,
    TaskCriteria,
};
use command::Command;
use flow::ProcessModel;
use model::{
    HistoricActivityInstance, HistoricTaskInstance, ProcessDefinition, ProcessInstance, Task,
    Variables,
};

#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Highest deployed version for `key`.
    async fn find_latest_definition(&self, key: &str) -> Result<Option<ProcessDefinition>>;

    async fn flow_model(&self, definition_id: &str) -> Result<Option<Arc<ProcessModel>>>;

    async fn count_definitions(&self, criteria: &ProcessDefinitionCriteria) -> Result<u64>;

    async fn list_definitions(
        &self,
        criteria: &ProcessDefinitionCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<ProcessDefinition>>;
}

#[async_trait]
pub trait RuntimeService: Send + Sync {
    async fn start_instance(
        &self,
        definition_id: &str,
        business_key: Option<&str>,
        variables: Variables,
    ) -> Result<ProcessInstance>;

    async fn find_instance(&self, instance_id: &str) -> Result<Option<ProcessInstance>>;

    async fn find_active_instance(&self, instance_id: &str) -> Result<Option<ProcessInstance>> {
        Ok(self
            .find_instance(instance_id)
            .await?
            .filter(|instance| instance.is_active()))
    }

    async fn suspend_instance(&self, instance_id: &str) -> Result<()>;

    async fn activate_instance(&self, instance_id: &str) -> Result<()>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn count_tasks(&self, criteria: &TaskCriteria) -> Result<u64>;

    async fn list_tasks(&self, criteria: &TaskCriteria, window: Option<PageWindow>) -> Result<Vec<Task>>;

    /// Merges into the owning process instance's variables.
    async fn set_variables(&self, task_id: &str, variables: Variables) -> Result<()>;

    async fn set_variables_local(&self, task_id: &str, variables: Variables) -> Result<()>;

    async fn complete(&self, task_id: &str) -> Result<()>;

    async fn claim(&self, task_id: &str, user_id: &str) -> Result<()>;

    async fn set_assignee(&self, task_id: &str, user_id: &str) -> Result<()>;

    async fn add_candidate_user(&self, task_id: &str, user_id: &str) -> Result<()>;

    async fn delete_candidate_user(&self, task_id: &str, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn count_historic_tasks(&self, criteria: &HistoricTaskCriteria) -> Result<u64>;

    async fn list_historic_tasks(
        &self,
        criteria: &HistoricTaskCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<HistoricTaskInstance>>;

    async fn count_historic_activities(&self, criteria: &HistoricActivityCriteria) -> Result<u64>;

    async fn list_historic_activities(
        &self,
        criteria: &HistoricActivityCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<HistoricActivityInstance>>;
}

#[async_trait]
pub trait ManagementService: Send + Sync {
    async fn execute_command(&self, command: Command) -> Result<()>;
}

/// Handle to every engine sub-service. Cheap to clone (just Arcs).
#[derive(Clone)]
pub struct ProcessEngine {
    pub repository: Arc<dyn RepositoryService>,
    pub runtime: Arc<dyn RuntimeService>,
    pub tasks: Arc<dyn TaskService>,
    pub history: Arc<dyn HistoryService>,
    pub management: Arc<dyn ManagementService>,
}

impl ProcessEngine {
    /// Uses one backend for all five services.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RepositoryService
            + RuntimeService
            + TaskService
            + HistoryService
            + ManagementService
            + 'static,
    {
        Self {
            repository: backend.clone(),
            runtime: backend.clone(),
            tasks: backend.clone(),
            history: backend.clone(),
            management: backend,
        }
    }

    pub fn definition_query(&self) -> Query<ProcessDefinitionCriteria> {
        Query::new(self.clone())
    }

    pub fn task_query(&self) -> Query<TaskCriteria> {
        Query::new(self.clone())
    }

    pub fn historic_task_query(&self) -> Query<HistoricTaskCriteria> {
        Query::new(self.clone())
    }

    pub fn historic_activity_query(&self) -> Query<HistoricActivityCriteria> {
        Query::new(self.clone())
    }
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine").finish_non_exhaustive()
    }
}
