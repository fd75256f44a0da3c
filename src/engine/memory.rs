use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::command::{Command, JumpTaskCommand};
use crate::engine::flow::{FlowElementKind, ProcessModel, evaluate_condition, substitute_expression};
use crate::engine::model::{
    HistoricActivityInstance, HistoricTaskInstance, ProcessDefinition, ProcessInstance, Task,
    Variables,
};
use crate::engine::{
    HistoryService, ManagementService, ProcessEngine, RepositoryService, RuntimeService,
    TaskService,
};
use crate::query::{
    HistoricActivityCriteria, HistoricTaskCriteria, PageWindow, ProcessDefinitionCriteria,
    TaskCriteria,
};

struct Stored<T> {
    seq: u64,
    record: T,
}

/// Process engine kept entirely in memory.
///
/// Records are listed in creation order. Every map is independent, so callers
/// get per-record consistency only, same as a real engine without a
/// surrounding transaction.
pub struct InMemoryEngine {
    definitions: DashMap<String, Stored<ProcessDefinition>>,
    // Keyed by definition id.
    models: DashMap<String, Arc<ProcessModel>>,
    instances: DashMap<String, Stored<ProcessInstance>>,
    tasks: DashMap<String, Stored<Task>>,
    historic_tasks: DashMap<String, Stored<HistoricTaskInstance>>,
    historic_activities: DashMap<String, Stored<HistoricActivityInstance>>,
    sequence: AtomicU64,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn collect_sorted<T: Clone>(map: &DashMap<String, Stored<T>>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut found: Vec<(u64, T)> = map
        .iter()
        .filter(|entry| keep(&entry.record))
        .map(|entry| (entry.seq, entry.record.clone()))
        .collect();
    found.sort_by_key(|(seq, _)| *seq);
    found.into_iter().map(|(_, record)| record).collect()
}

fn apply_window<T>(records: Vec<T>, window: Option<PageWindow>) -> Vec<T> {
    match window {
        Some(w) => records.into_iter().skip(w.offset).take(w.limit).collect(),
        None => records,
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
            models: DashMap::new(),
            instances: DashMap::new(),
            tasks: DashMap::new(),
            historic_tasks: DashMap::new(),
            historic_activities: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }

    /// Wraps a shared engine in the service bundle the orchestration layer uses.
    pub fn process_engine(self: &Arc<Self>) -> ProcessEngine {
        ProcessEngine::from_backend(self.clone())
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Publishes a model; redeploying a key bumps its version.
    pub fn deploy(&self, model: ProcessModel) -> Result<ProcessDefinition> {
        model.validate()?;
        let version = self
            .definitions
            .iter()
            .filter(|d| d.record.key == model.key)
            .map(|d| d.record.version)
            .max()
            .unwrap_or(0)
            + 1;

        let definition = ProcessDefinition {
            id: format!("{}:{}", model.key, version),
            key: model.key.clone(),
            name: model.name.clone(),
            version,
        };
        self.models.insert(definition.id.clone(), Arc::new(model));
        self.definitions.insert(
            definition.id.clone(),
            Stored {
                seq: self.next_seq(),
                record: definition.clone(),
            },
        );
        info!(definition_id = %definition.id, "Deployed process definition");
        Ok(definition)
    }

    fn instance(&self, instance_id: &str) -> Result<ProcessInstance> {
        self.instances
            .get(instance_id)
            .map(|i| i.record.clone())
            .ok_or_else(|| anyhow!("Process instance not found: {}", instance_id))
    }

    fn task(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .get(task_id)
            .map(|t| t.record.clone())
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))
    }

    fn model_for(&self, definition_id: &str) -> Result<Arc<ProcessModel>> {
        self.models
            .get(definition_id)
            .map(|m| m.clone())
            .ok_or_else(|| anyhow!("Process model not found for definition: {}", definition_id))
    }

    fn enter_node(&self, instance_id: &str, model: &ProcessModel, node_id: &str, execution_id: &str) -> Result<()> {
        let element = model
            .flow_element(node_id)
            .ok_or_else(|| anyhow!("Flow node not found: {}", node_id))?;
        let instance = self.instance(instance_id)?;
        debug!(instance_id, node_id, execution_id, "Entering flow node");

        match &element.kind {
            FlowElementKind::StartEvent => {
                self.record_activity(
                    &instance,
                    element.id.as_str(),
                    element.name.clone(),
                    element.activity_type(),
                    execution_id,
                    None,
                    None,
                    true,
                );
                self.leave_node(instance_id, model, node_id, execution_id)
            }
            FlowElementKind::UserTask { assignee, candidate_users } => {
                let assignee = assignee
                    .as_deref()
                    .and_then(|a| substitute_expression(a, &instance.variables));
                let mut candidates = Vec::new();
                for raw in candidate_users {
                    if let Some(user) = substitute_expression(raw, &instance.variables)
                        && !candidates.contains(&user)
                    {
                        candidates.push(user);
                    }
                }

                let task = Task {
                    id: new_id(),
                    name: element.display_name().to_string(),
                    process_instance_id: instance.id.clone(),
                    process_definition_id: instance.process_definition_id.clone(),
                    execution_id: execution_id.to_string(),
                    task_definition_key: element.id.clone(),
                    business_key: instance.business_key.clone(),
                    assignee,
                    candidate_users: candidates,
                    local_variables: Variables::new(),
                    suspended: instance.suspended,
                };

                self.historic_tasks.insert(
                    task.id.clone(),
                    Stored {
                        seq: self.next_seq(),
                        record: HistoricTaskInstance {
                            id: task.id.clone(),
                            name: task.name.clone(),
                            process_instance_id: task.process_instance_id.clone(),
                            process_definition_id: task.process_definition_id.clone(),
                            task_definition_key: task.task_definition_key.clone(),
                            assignee: task.assignee.clone(),
                            delete_reason: None,
                            finished: false,
                        },
                    },
                );
                self.record_activity(
                    &instance,
                    element.id.as_str(),
                    element.name.clone(),
                    element.activity_type(),
                    execution_id,
                    Some(task.id.clone()),
                    task.assignee.clone(),
                    false,
                );
                info!(instance_id, task_id = %task.id, node_id, "Created user task");
                self.tasks.insert(
                    task.id.clone(),
                    Stored {
                        seq: self.next_seq(),
                        record: task,
                    },
                );
                Ok(())
            }
            FlowElementKind::EndEvent => {
                self.record_activity(
                    &instance,
                    element.id.as_str(),
                    element.name.clone(),
                    element.activity_type(),
                    execution_id,
                    None,
                    None,
                    true,
                );
                self.end_if_idle(instance_id);
                Ok(())
            }
        }
    }

    /// Follows every outgoing flow whose condition holds. A single target keeps
    /// the execution; several targets fork into new executions.
    fn leave_node(&self, instance_id: &str, model: &ProcessModel, node_id: &str, execution_id: &str) -> Result<()> {
        let variables = self.instance(instance_id)?.variables;
        let mut targets = Vec::new();
        for flow in model.outgoing(node_id) {
            let taken = match &flow.condition {
                Some(condition) => evaluate_condition(condition, &variables)?,
                None => true,
            };
            if taken {
                targets.push(flow.target.clone());
            }
        }

        match targets.len() {
            0 => {
                self.end_if_idle(instance_id);
                Ok(())
            }
            1 => self.enter_node(instance_id, model, &targets[0], execution_id),
            _ => {
                for target in &targets {
                    self.enter_node(instance_id, model, target, &new_id())?;
                }
                Ok(())
            }
        }
    }

    fn end_if_idle(&self, instance_id: &str) {
        let busy = self
            .tasks
            .iter()
            .any(|t| t.record.process_instance_id == instance_id);
        if busy {
            return;
        }
        if let Some(mut instance) = self.instances.get_mut(instance_id) {
            instance.record.ended = true;
            info!(instance_id, "Process instance ended");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_activity(
        &self,
        instance: &ProcessInstance,
        activity_id: &str,
        activity_name: Option<String>,
        activity_type: &str,
        execution_id: &str,
        task_id: Option<String>,
        assignee: Option<String>,
        finished: bool,
    ) {
        let activity = HistoricActivityInstance {
            id: new_id(),
            activity_id: activity_id.to_string(),
            activity_name,
            activity_type: activity_type.to_string(),
            process_instance_id: instance.id.clone(),
            process_definition_id: instance.process_definition_id.clone(),
            execution_id: execution_id.to_string(),
            task_id,
            assignee,
            finished,
        };
        self.historic_activities.insert(
            activity.id.clone(),
            Stored {
                seq: self.next_seq(),
                record: activity,
            },
        );
    }

    fn finish_task_history(&self, task_id: &str, delete_reason: Option<String>) {
        if let Some(mut historic) = self.historic_tasks.get_mut(task_id) {
            historic.record.finished = true;
            historic.record.delete_reason = delete_reason;
        }
        for mut activity in self.historic_activities.iter_mut() {
            if activity.record.task_id.as_deref() == Some(task_id) {
                activity.record.finished = true;
            }
        }
    }

    fn update_assignee_history(&self, task_id: &str, assignee: &str) {
        if let Some(mut historic) = self.historic_tasks.get_mut(task_id) {
            historic.record.assignee = Some(assignee.to_string());
        }
        for mut activity in self.historic_activities.iter_mut() {
            if activity.record.task_id.as_deref() == Some(task_id) {
                activity.record.assignee = Some(assignee.to_string());
            }
        }
    }

    fn set_instance_suspended(&self, instance_id: &str, suspended: bool) -> Result<()> {
        {
            let mut instance = self
                .instances
                .get_mut(instance_id)
                .ok_or_else(|| anyhow!("Process instance not found: {}", instance_id))?;
            if instance.record.ended {
                bail!("Process instance {} has already ended", instance_id);
            }
            instance.record.suspended = suspended;
        }
        for mut task in self.tasks.iter_mut() {
            if task.record.process_instance_id == instance_id {
                task.record.suspended = suspended;
            }
        }
        info!(instance_id, suspended, "Changed process instance suspension state");
        Ok(())
    }

    fn jump(&self, command: &JumpTaskCommand) -> Result<()> {
        let JumpTaskCommand { execution_id, target_task_key } = command;

        let instance_id = self
            .tasks
            .iter()
            .find(|t| &t.record.execution_id == execution_id)
            .map(|t| t.record.process_instance_id.clone())
            .or_else(|| {
                self.historic_activities
                    .iter()
                    .find(|a| &a.record.execution_id == execution_id)
                    .map(|a| a.record.process_instance_id.clone())
            })
            .ok_or_else(|| anyhow!("Execution not found: {}", execution_id))?;

        let instance = self.instance(&instance_id)?;
        if !instance.is_active() {
            bail!("Process instance {} is not active, cannot jump", instance_id);
        }
        let model = self.model_for(&instance.process_definition_id)?;
        if model.flow_element(target_task_key).is_none() {
            bail!("Target node not found: {}", target_task_key);
        }

        let abandoned: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| &t.record.execution_id == execution_id)
            .map(|t| t.record.id.clone())
            .collect();
        for task_id in &abandoned {
            self.tasks.remove(task_id);
            self.finish_task_history(task_id, Some(format!("jump to {}", target_task_key)));
        }

        info!(
            instance_id = %instance_id,
            execution_id = %execution_id,
            target = %target_task_key,
            abandoned = abandoned.len(),
            "Jumping execution"
        );
        self.enter_node(&instance_id, &model, target_task_key, execution_id)
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryService for InMemoryEngine {
    async fn find_latest_definition(&self, key: &str) -> Result<Option<ProcessDefinition>> {
        Ok(self
            .definitions
            .iter()
            .filter(|d| d.record.key == key)
            .max_by_key(|d| d.record.version)
            .map(|d| d.record.clone()))
    }

    async fn flow_model(&self, definition_id: &str) -> Result<Option<Arc<ProcessModel>>> {
        Ok(self.models.get(definition_id).map(|m| m.clone()))
    }

    async fn count_definitions(&self, criteria: &ProcessDefinitionCriteria) -> Result<u64> {
        Ok(self.list_definitions(criteria, None).await?.len() as u64)
    }

    async fn list_definitions(
        &self,
        criteria: &ProcessDefinitionCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<ProcessDefinition>> {
        let mut found = collect_sorted(&self.definitions, |d| criteria.matches(d));
        if criteria.latest_version {
            let mut latest: HashMap<String, u32> = HashMap::new();
            for d in self.definitions.iter() {
                let entry = latest.entry(d.record.key.clone()).or_default();
                *entry = (*entry).max(d.record.version);
            }
            found.retain(|d| latest.get(&d.key) == Some(&d.version));
        }
        Ok(apply_window(found, window))
    }
}

#[async_trait]
impl RuntimeService for InMemoryEngine {
    async fn start_instance(
        &self,
        definition_id: &str,
        business_key: Option<&str>,
        variables: Variables,
    ) -> Result<ProcessInstance> {
        let definition = self
            .definitions
            .get(definition_id)
            .map(|d| d.record.clone())
            .ok_or_else(|| anyhow!("Process definition not found: {}", definition_id))?;
        let model = self.model_for(definition_id)?;
        let start = model
            .start_event()
            .ok_or_else(|| anyhow!("Start event not found in process model {}", model.key))?;

        let instance = ProcessInstance {
            id: new_id(),
            process_definition_id: definition.id.clone(),
            process_definition_key: definition.key.clone(),
            business_key: business_key.map(str::to_string),
            variables,
            suspended: false,
            ended: false,
        };
        let instance_id = instance.id.clone();
        self.instances.insert(
            instance_id.clone(),
            Stored {
                seq: self.next_seq(),
                record: instance,
            },
        );
        info!(instance_id = %instance_id, definition_id, "Started process instance");

        self.enter_node(&instance_id, &model, &start.id, &new_id())?;
        self.instance(&instance_id)
    }

    async fn find_instance(&self, instance_id: &str) -> Result<Option<ProcessInstance>> {
        Ok(self.instances.get(instance_id).map(|i| i.record.clone()))
    }

    async fn suspend_instance(&self, instance_id: &str) -> Result<()> {
        self.set_instance_suspended(instance_id, true)
    }

    async fn activate_instance(&self, instance_id: &str) -> Result<()> {
        self.set_instance_suspended(instance_id, false)
    }
}

#[async_trait]
impl TaskService for InMemoryEngine {
    async fn count_tasks(&self, criteria: &TaskCriteria) -> Result<u64> {
        Ok(self.tasks.iter().filter(|t| criteria.matches(&t.record)).count() as u64)
    }

    async fn list_tasks(&self, criteria: &TaskCriteria, window: Option<PageWindow>) -> Result<Vec<Task>> {
        Ok(apply_window(
            collect_sorted(&self.tasks, |t| criteria.matches(t)),
            window,
        ))
    }

    async fn set_variables(&self, task_id: &str, variables: Variables) -> Result<()> {
        let task = self.task(task_id)?;
        let mut instance = self
            .instances
            .get_mut(&task.process_instance_id)
            .ok_or_else(|| anyhow!("Process instance not found: {}", task.process_instance_id))?;
        instance.record.variables.extend(variables);
        Ok(())
    }

    async fn set_variables_local(&self, task_id: &str, variables: Variables) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        task.record.local_variables.extend(variables);
        Ok(())
    }

    async fn complete(&self, task_id: &str) -> Result<()> {
        let task = self.task(task_id)?;
        let instance = self.instance(&task.process_instance_id)?;
        if instance.suspended {
            bail!(
                "Cannot complete task {}: process instance {} is suspended",
                task_id,
                instance.id
            );
        }
        let model = self.model_for(&task.process_definition_id)?;

        self.tasks.remove(task_id);
        self.finish_task_history(task_id, None);
        info!(task_id, instance_id = %instance.id, "Completed task");

        self.leave_node(&instance.id, &model, &task.task_definition_key, &task.execution_id)
    }

    async fn claim(&self, task_id: &str, user_id: &str) -> Result<()> {
        {
            let mut task = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
            if let Some(assignee) = &task.record.assignee
                && assignee != user_id
            {
                bail!("Task {} is already claimed by {}", task_id, assignee);
            }
            task.record.assignee = Some(user_id.to_string());
        }
        self.update_assignee_history(task_id, user_id);
        Ok(())
    }

    async fn set_assignee(&self, task_id: &str, user_id: &str) -> Result<()> {
        {
            let mut task = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
            task.record.assignee = Some(user_id.to_string());
        }
        self.update_assignee_history(task_id, user_id);
        Ok(())
    }

    async fn add_candidate_user(&self, task_id: &str, user_id: &str) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        if !task.record.candidate_users.iter().any(|c| c == user_id) {
            task.record.candidate_users.push(user_id.to_string());
        }
        Ok(())
    }

    async fn delete_candidate_user(&self, task_id: &str, user_id: &str) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        task.record.candidate_users.retain(|c| c != user_id);
        Ok(())
    }
}

#[async_trait]
impl HistoryService for InMemoryEngine {
    async fn count_historic_tasks(&self, criteria: &HistoricTaskCriteria) -> Result<u64> {
        Ok(self
            .historic_tasks
            .iter()
            .filter(|t| criteria.matches(&t.record))
            .count() as u64)
    }

    async fn list_historic_tasks(
        &self,
        criteria: &HistoricTaskCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<HistoricTaskInstance>> {
        Ok(apply_window(
            collect_sorted(&self.historic_tasks, |t| criteria.matches(t)),
            window,
        ))
    }

    async fn count_historic_activities(&self, criteria: &HistoricActivityCriteria) -> Result<u64> {
        Ok(self
            .historic_activities
            .iter()
            .filter(|a| criteria.matches(&a.record))
            .count() as u64)
    }

    async fn list_historic_activities(
        &self,
        criteria: &HistoricActivityCriteria,
        window: Option<PageWindow>,
    ) -> Result<Vec<HistoricActivityInstance>> {
        Ok(apply_window(
            collect_sorted(&self.historic_activities, |a| criteria.matches(a)),
            window,
        ))
    }
}

#[async_trait]
impl ManagementService for InMemoryEngine {
    async fn execute_command(&self, command: Command) -> Result<()> {
        match command {
            Command::Jump(jump) => self.jump(&jump),
        }
    }
}
