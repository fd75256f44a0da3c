use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine::ProcessEngine;
use crate::engine::model::{
    HistoricActivityInstance, HistoricTaskInstance, ProcessDefinition, Task,
};
use crate::error::WorkflowError;
use crate::query::binding::{QueryBindings, expect_string, expect_u32};
use crate::query::criteria::{
    HistoricActivityCriteria, HistoricTaskCriteria, ProcessDefinitionCriteria, TaskCriteria,
};
use crate::query::{Criteria, Query};

/// The closed set of record kinds the engine can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    ProcessDefinition,
    Task,
    HistoricTaskInstance,
    HistoricActivityInstance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::ProcessDefinition,
        EntityKind::Task,
        EntityKind::HistoricTaskInstance,
        EntityKind::HistoricActivityInstance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ProcessDefinition => "process-definition",
            EntityKind::Task => "task",
            EntityKind::HistoricTaskInstance => "historic-task-instance",
            EntityKind::HistoricActivityInstance => "historic-activity-instance",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind `{}`", s))
    }
}

/// Ties a record type to its entity kind, criteria and default binding table.
pub trait Queryable: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;
    type Criteria: Criteria<Record = Self>;

    fn bindings() -> QueryBindings<Self::Criteria>;
}

/// Produces fresh queries of one kind, together with the kind's binding table.
pub struct QueryFactory<C: Criteria> {
    engine: ProcessEngine,
    bindings: QueryBindings<C>,
}

impl<C: Criteria> QueryFactory<C> {
    pub fn create(&self) -> Query<C> {
        Query::new(self.engine.clone())
    }

    pub fn bindings(&self) -> &QueryBindings<C> {
        &self.bindings
    }
}

/// Entity kind → query factory, built once and shared by reference.
pub struct QueryRegistry {
    engine: ProcessEngine,
    factories: HashMap<EntityKind, Arc<dyn Any + Send + Sync>>,
}

impl QueryRegistry {
    /// Empty registry; kinds must be registered explicitly.
    pub fn empty(engine: ProcessEngine) -> Self {
        Self {
            engine,
            factories: HashMap::new(),
        }
    }

    /// Registry with all four built-in kinds.
    pub fn new(engine: ProcessEngine) -> Self {
        Self::empty(engine)
            .register::<ProcessDefinition>()
            .register::<Task>()
            .register::<HistoricTaskInstance>()
            .register::<HistoricActivityInstance>()
    }

    pub fn register<R: Queryable>(self) -> Self {
        self.register_with::<R>(R::bindings())
    }

    /// Registers a kind with a caller-supplied binding table, replacing any
    /// earlier registration of the same kind.
    pub fn register_with<R: Queryable>(mut self, bindings: QueryBindings<R::Criteria>) -> Self {
        let factory = QueryFactory {
            engine: self.engine.clone(),
            bindings,
        };
        self.factories.insert(R::KIND, Arc::new(factory));
        self
    }

    pub fn is_registered(&self, kind: EntityKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn engine(&self) -> &ProcessEngine {
        &self.engine
    }

    pub fn supplier_for<R: Queryable>(&self) -> Result<Arc<QueryFactory<R::Criteria>>, WorkflowError> {
        self.factories
            .get(&R::KIND)
            .cloned()
            .and_then(|f| f.downcast::<QueryFactory<R::Criteria>>().ok())
            .ok_or(WorkflowError::UnsupportedEntityKind(R::KIND))
    }
}

impl Queryable for ProcessDefinition {
    const KIND: EntityKind = EntityKind::ProcessDefinition;
    type Criteria = ProcessDefinitionCriteria;

    fn bindings() -> QueryBindings<ProcessDefinitionCriteria> {
        QueryBindings::<ProcessDefinitionCriteria>::new()
            .value("definition_id", |c, v| {
                c.definition_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("key", |c, v| {
                c.key = Some(expect_string(v)?);
                Ok(())
            })
            .value("key_like", |c, v| {
                c.key_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("name", |c, v| {
                c.name = Some(expect_string(v)?);
                Ok(())
            })
            .value("name_like", |c, v| {
                c.name_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("version", |c, v| {
                c.version = Some(expect_u32(v)?);
                Ok(())
            })
            .flag("latest_version", |c| c.latest_version = true)
    }
}

impl Queryable for Task {
    const KIND: EntityKind = EntityKind::Task;
    type Criteria = TaskCriteria;

    fn bindings() -> QueryBindings<TaskCriteria> {
        QueryBindings::<TaskCriteria>::new()
            .value("task_id", |c, v| {
                c.task_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("name", |c, v| {
                c.name = Some(expect_string(v)?);
                Ok(())
            })
            .value("name_like", |c, v| {
                c.name_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_instance_id", |c, v| {
                c.process_instance_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_definition_id", |c, v| {
                c.process_definition_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("execution_id", |c, v| {
                c.execution_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("task_definition_key", |c, v| {
                c.task_definition_key = Some(expect_string(v)?);
                Ok(())
            })
            .value("business_key", |c, v| {
                c.business_key = Some(expect_string(v)?);
                Ok(())
            })
            .value("business_key_like", |c, v| {
                c.business_key_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("assignee", |c, v| {
                c.assignee = Some(expect_string(v)?);
                Ok(())
            })
            .value("assignee_like", |c, v| {
                c.assignee_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("candidate_user", |c, v| {
                c.candidate_user = Some(expect_string(v)?);
                Ok(())
            })
            .value("candidate_or_assigned", |c, v| {
                c.candidate_or_assigned = Some(expect_string(v)?);
                Ok(())
            })
            .flag("unassigned", |c| c.unassigned = true)
            .flag("active", |c| c.active = true)
            .flag("suspended", |c| c.suspended = true)
    }
}

impl Queryable for HistoricTaskInstance {
    const KIND: EntityKind = EntityKind::HistoricTaskInstance;
    type Criteria = HistoricTaskCriteria;

    fn bindings() -> QueryBindings<HistoricTaskCriteria> {
        QueryBindings::<HistoricTaskCriteria>::new()
            .value("task_id", |c, v| {
                c.task_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("name_like", |c, v| {
                c.name_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_instance_id", |c, v| {
                c.process_instance_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_definition_id", |c, v| {
                c.process_definition_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("task_definition_key", |c, v| {
                c.task_definition_key = Some(expect_string(v)?);
                Ok(())
            })
            .value("assignee", |c, v| {
                c.assignee = Some(expect_string(v)?);
                Ok(())
            })
            .value("assignee_like", |c, v| {
                c.assignee_like = Some(expect_string(v)?);
                Ok(())
            })
            .flag("finished", |c| c.finished = true)
            .flag("unfinished", |c| c.unfinished = true)
    }
}

impl Queryable for HistoricActivityInstance {
    const KIND: EntityKind = EntityKind::HistoricActivityInstance;
    type Criteria = HistoricActivityCriteria;

    fn bindings() -> QueryBindings<HistoricActivityCriteria> {
        QueryBindings::<HistoricActivityCriteria>::new()
            .value("activity_id", |c, v| {
                c.activity_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("activity_name_like", |c, v| {
                c.activity_name_like = Some(expect_string(v)?);
                Ok(())
            })
            .value("activity_type", |c, v| {
                c.activity_type = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_instance_id", |c, v| {
                c.process_instance_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("process_definition_id", |c, v| {
                c.process_definition_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("execution_id", |c, v| {
                c.execution_id = Some(expect_string(v)?);
                Ok(())
            })
            .value("assignee", |c, v| {
                c.assignee = Some(expect_string(v)?);
                Ok(())
            })
            .flag("finished", |c| c.finished = true)
            .flag("unfinished", |c| c.unfinished = true)
    }
}
