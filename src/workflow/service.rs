use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::ProcessEngine;
use crate::engine::command::JumpTaskCommand;
use crate::engine::flow::substitute_expression;
use crate::engine::model::{ProcessInstance, Task};
use crate::error::WorkflowError;
use crate::workflow::model::{CandidateSource, StartProcessModel, TaskCompleteModel, WorkflowContext};
use crate::workflow::resolver::{PassthroughCandidateResolver, TaskCandidateResolver};

/// What candidate assignment did to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "users", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// Had an assignee already; left untouched.
    AlreadyAssigned,
    NotUserTask,
    Assigned(String),
    Candidates(Vec<String>),
    /// Resolver produced nobody; no assignee and no candidates.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentFailure {
    pub task_id: String,
    pub error: String,
}

/// Per-task results of the downstream fan-out after a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub assigned: Vec<(String, AssignmentOutcome)>,
    pub failed: Vec<AssignmentFailure>,
    /// Set when the active tasks could not be listed at all.
    pub enumeration_error: Option<String>,
}

impl AssignmentReport {
    pub fn outcome_for(&self, task_id: &str) -> Option<&AssignmentOutcome> {
        self.assigned
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.enumeration_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteOutcome {
    pub task_id: String,
    pub assignments: AssignmentReport,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Task lifecycle operations on top of a process engine.
///
/// Holds no engine state between calls: every decision re-queries the engine.
pub struct WorkflowService {
    engine: ProcessEngine,
    resolver: Arc<dyn TaskCandidateResolver>,
}

impl WorkflowService {
    pub fn new(engine: ProcessEngine) -> Self {
        Self::with_resolver(engine, Arc::new(PassthroughCandidateResolver))
    }

    pub fn with_resolver(engine: ProcessEngine, resolver: Arc<dyn TaskCandidateResolver>) -> Self {
        Self { engine, resolver }
    }

    pub fn engine(&self) -> &ProcessEngine {
        &self.engine
    }

    /// Starts the latest definition of the key. When an initiator is given and
    /// one of the new instance's active tasks is theirs, that task is completed
    /// on their behalf.
    pub async fn start_process(&self, model: &StartProcessModel) -> Result<ProcessInstance, WorkflowError> {
        let key = model.process_definition_key.as_str();
        let definition = self
            .engine
            .repository
            .find_latest_definition(key)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(key.to_string()))?;

        let instance = self
            .engine
            .runtime
            .start_instance(&definition.id, model.business_key.as_deref(), model.variables.clone())
            .await?;
        info!(
            instance_id = %instance.id,
            definition_id = %definition.id,
            business_key = ?instance.business_key,
            "Started process"
        );

        let Some(user_id) = non_blank(model.user_id.as_deref()) else {
            return Ok(instance);
        };

        let mut own_tasks = self
            .engine
            .task_query()
            .filter(|c| c.process_instance_id(&instance.id).candidate_or_assigned(user_id).active())
            .list()
            .await?;
        if own_tasks.len() > 1 {
            warn!(
                instance_id = %instance.id,
                user_id,
                matches = own_tasks.len(),
                "Several tasks match the initiator, auto-completing the first"
            );
        }
        if own_tasks.is_empty() {
            return Ok(instance);
        }
        let first = own_tasks.swap_remove(0);

        let complete = TaskCompleteModel {
            task_id: Some(first.id.clone()),
            user_id: Some(user_id.to_string()),
            variables: instance.variables.clone(),
            task_variables: instance.variables.clone(),
            target_task_key: None,
            candidate_or_assigned: model.candidate_or_assigned.clone(),
        };
        self.complete_task(&complete, true).await?;
        debug!(instance_id = %instance.id, task_id = %first.id, "Auto-completed initiator task");

        Ok(self
            .engine
            .runtime
            .find_instance(&instance.id)
            .await?
            .unwrap_or(instance))
    }

    /// Completes a task claimed by the acting user, then assigns whatever
    /// became active. Downstream assignment failures are reported, not returned.
    pub async fn complete(&self, model: &TaskCompleteModel) -> Result<CompleteOutcome, WorkflowError> {
        self.complete_task(model, false).await
    }

    /// With `claim_unassigned`, an open task is first claimed for the acting
    /// user. That claim is not undone if the completion fails afterwards.
    async fn complete_task(
        &self,
        model: &TaskCompleteModel,
        claim_unassigned: bool,
    ) -> Result<CompleteOutcome, WorkflowError> {
        let task_id = non_blank(model.task_id.as_deref()).ok_or(WorkflowError::MissingTaskId)?;

        let mut task = self
            .engine
            .task_query()
            .filter(|c| c.task_id(task_id).active())
            .single_result()
            .await?
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;

        if claim_unassigned
            && task.assignee.is_none()
            && let Some(user_id) = non_blank(model.user_id.as_deref())
        {
            self.engine.tasks.claim(&task.id, user_id).await?;
            task.assignee = Some(user_id.to_string());
        }

        let Some(assignee) = task.assignee.as_deref() else {
            return Err(WorkflowError::TaskNotClaimed(task.id.clone()));
        };
        if model.user_id.as_deref().map(str::trim) != Some(assignee) {
            return Err(WorkflowError::WrongAssignee {
                task_id: task.id.clone(),
                user_id: model.user_id.clone().unwrap_or_default(),
            });
        }

        if !model.variables.is_empty() {
            self.engine.tasks.set_variables(&task.id, model.variables.clone()).await?;
        }
        if !model.task_variables.is_empty() {
            self.engine
                .tasks
                .set_variables_local(&task.id, model.task_variables.clone())
                .await?;
        }
        self.engine.tasks.complete(&task.id).await?;
        info!(task_id = %task.id, user_id = assignee, instance_id = %task.process_instance_id, "Completed task");

        if let Some(target) = non_blank(model.target_task_key.as_deref()) {
            self.jump_execution(&task, target).await?;
        }

        let assignments = self.assign_active_tasks(&task.process_instance_id, model).await;
        Ok(CompleteOutcome {
            task_id: task.id,
            assignments,
        })
    }

    async fn assign_active_tasks(&self, instance_id: &str, source: &dyn CandidateSource) -> AssignmentReport {
        let mut report = AssignmentReport::default();
        let active = match self
            .engine
            .task_query()
            .filter(|c| c.process_instance_id(instance_id).active())
            .list()
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(instance_id, error = %e, "Could not list active tasks for assignment");
                report.enumeration_error = Some(e.to_string());
                return report;
            }
        };

        for task in &active {
            match self.set_candidate_or_assigned(task, source).await {
                Ok(outcome) => report.assigned.push((task.id.clone(), outcome)),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Candidate assignment failed");
                    report.failed.push(AssignmentFailure {
                        task_id: task.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Assigns an unassigned task from its flow node's candidates plus the
    /// source's overrides. A task that already has an assignee is left alone.
    pub async fn set_candidate_or_assigned(
        &self,
        task: &Task,
        source: &dyn CandidateSource,
    ) -> Result<AssignmentOutcome, WorkflowError> {
        if task.assignee.is_some() {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }

        let model = self
            .engine
            .repository
            .flow_model(&task.process_definition_id)
            .await?
            .ok_or_else(|| WorkflowError::FlowModelNotFound(task.process_definition_id.clone()))?;
        let Some(element) = model
            .flow_element(&task.task_definition_key)
            .filter(|e| e.is_user_task())
        else {
            return Ok(AssignmentOutcome::NotUserTask);
        };

        let instance = self.engine.runtime.find_instance(&task.process_instance_id).await?;
        let variables = instance.as_ref().map(|i| i.variables.clone()).unwrap_or_default();

        let mut raw: Vec<String> = Vec::new();
        for entry in element
            .candidate_users()
            .iter()
            .chain(source.candidate_or_assigned())
        {
            if let Some(entry) = substitute_expression(entry, &variables)
                && !raw.contains(&entry)
            {
                raw.push(entry);
            }
        }

        for user in &raw {
            self.engine.tasks.delete_candidate_user(&task.id, user).await?;
        }

        let ctx = WorkflowContext {
            engine: self.engine.clone(),
            process_instance: instance,
            task: task.clone(),
            flow_element: Some(element.clone()),
            current_user_id: source.user_id().map(str::to_string),
        };
        let resolved = self.resolver.resolve(&ctx, &raw).await?.unwrap_or_default();

        match resolved.as_slice() {
            [] => {
                warn!(task_id = %task.id, "No candidates resolved, task left unassigned");
                Ok(AssignmentOutcome::Unresolved)
            }
            [only] => {
                self.engine.tasks.set_assignee(&task.id, only).await?;
                debug!(task_id = %task.id, assignee = %only, "Assigned task");
                Ok(AssignmentOutcome::Assigned(only.clone()))
            }
            many => {
                for user in many {
                    self.engine.tasks.add_candidate_user(&task.id, user).await?;
                }
                debug!(task_id = %task.id, candidates = ?many, "Offered task to candidates");
                Ok(AssignmentOutcome::Candidates(many.to_vec()))
            }
        }
    }

    pub async fn claim(&self, task_id: &str, user_id: &str) -> Result<(), WorkflowError> {
        let task_id = non_blank(Some(task_id)).ok_or(WorkflowError::MissingTaskId)?;
        let user_id = non_blank(Some(user_id)).ok_or(WorkflowError::MissingUserId)?;

        let task = self
            .engine
            .task_query()
            .filter(|c| c.task_id(task_id).candidate_or_assigned(user_id).active())
            .single_result()
            .await?
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        if task.assignee.is_some() {
            return Err(WorkflowError::AlreadyClaimed(task.id));
        }

        self.engine.tasks.claim(&task.id, user_id).await?;
        info!(task_id = %task.id, user_id, "Claimed task");
        Ok(())
    }

    /// Moves the task's execution to `target_task_key` without completing it.
    pub async fn jump(&self, task_id: &str, target_task_key: &str) -> Result<(), WorkflowError> {
        let task_id = non_blank(Some(task_id)).ok_or(WorkflowError::MissingTaskId)?;
        let task = self
            .engine
            .task_query()
            .filter(|c| c.task_id(task_id))
            .single_result()
            .await?
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        self.jump_execution(&task, target_task_key).await
    }

    async fn jump_execution(&self, task: &Task, target_task_key: &str) -> Result<(), WorkflowError> {
        if self
            .engine
            .runtime
            .find_active_instance(&task.process_instance_id)
            .await?
            .is_none()
        {
            return Err(WorkflowError::InstanceNotActive(task.process_instance_id.clone()));
        }

        let command = JumpTaskCommand::new(task.execution_id.as_str(), target_task_key);
        self.engine.management.execute_command(command.into()).await?;
        info!(
            task_id = %task.id,
            execution_id = %task.execution_id,
            target = target_task_key,
            "Jumped execution"
        );
        Ok(())
    }

    pub async fn suspend(&self, instance_id: &str) -> Result<(), WorkflowError> {
        self.engine.runtime.suspend_instance(instance_id).await?;
        info!(instance_id, "Suspended process instance");
        Ok(())
    }

    pub async fn activate(&self, instance_id: &str) -> Result<(), WorkflowError> {
        self.engine.runtime.activate_instance(instance_id).await?;
        info!(instance_id, "Activated process instance");
        Ok(())
    }
}
