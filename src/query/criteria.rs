//! Predicate sets for every queryable entity kind.
//!
//! Each criteria type is a plain value that accumulates predicates through
//! chained methods and knows how to test a single record. Engines decide how
//! to evaluate them; the in-memory engine calls `matches` directly.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::ProcessEngine;
use crate::engine::model::{
    HistoricActivityInstance, HistoricTaskInstance, ProcessDefinition, Task,
};
use crate::query::{Criteria, PageWindow};

/// SQL `LIKE` matching: `%` spans any run of characters, `_` exactly one.
pub fn like_matches(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, vi));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '_' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if let Some((bp, bv)) = backtrack {
            pi = bp + 1;
            vi = bv + 1;
            backtrack = Some((bp, bv + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

fn eq_opt(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().is_none_or(|e| e == actual)
}

fn eq_opt_opt(expected: &Option<String>, actual: &Option<String>) -> bool {
    match expected {
        None => true,
        Some(e) => actual.as_deref() == Some(e.as_str()),
    }
}

fn like_opt(pattern: &Option<String>, actual: &str) -> bool {
    pattern.as_deref().is_none_or(|p| like_matches(p, actual))
}

fn like_opt_opt(pattern: &Option<String>, actual: &Option<String>) -> bool {
    match pattern {
        None => true,
        Some(p) => actual.as_deref().is_some_and(|a| like_matches(p, a)),
    }
}

// --- PROCESS DEFINITION ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinitionCriteria {
    pub definition_id: Option<String>,
    pub key: Option<String>,
    pub key_like: Option<String>,
    pub name: Option<String>,
    pub name_like: Option<String>,
    pub version: Option<u32>,
    /// Keep only the highest version per key. Needs the full definition set,
    /// so engines apply it after `matches`.
    pub latest_version: bool,
}

impl ProcessDefinitionCriteria {
    pub fn definition_id(mut self, id: impl Into<String>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn key_like(mut self, pattern: impl Into<String>) -> Self {
        self.key_like = Some(pattern.into());
        self
    }

    pub fn name_like(mut self, pattern: impl Into<String>) -> Self {
        self.name_like = Some(pattern.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn latest_version(mut self) -> Self {
        self.latest_version = true;
        self
    }

    pub fn matches(&self, d: &ProcessDefinition) -> bool {
        eq_opt(&self.definition_id, &d.id)
            && eq_opt(&self.key, &d.key)
            && like_opt(&self.key_like, &d.key)
            && eq_opt(&self.name, &d.name)
            && like_opt(&self.name_like, &d.name)
            && self.version.is_none_or(|v| v == d.version)
    }
}

#[async_trait]
impl Criteria for ProcessDefinitionCriteria {
    type Record = ProcessDefinition;

    async fn count(&self, engine: &ProcessEngine) -> Result<u64> {
        engine.repository.count_definitions(self).await
    }

    async fn list(&self, engine: &ProcessEngine, window: Option<PageWindow>) -> Result<Vec<ProcessDefinition>> {
        engine.repository.list_definitions(self, window).await
    }
}

// --- TASK ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCriteria {
    pub task_id: Option<String>,
    pub name: Option<String>,
    pub name_like: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub execution_id: Option<String>,
    pub task_definition_key: Option<String>,
    pub business_key: Option<String>,
    pub business_key_like: Option<String>,
    pub assignee: Option<String>,
    pub assignee_like: Option<String>,
    pub candidate_user: Option<String>,
    pub candidate_or_assigned: Option<String>,
    pub unassigned: bool,
    pub active: bool,
    pub suspended: bool,
}

impl TaskCriteria {
    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn name_like(mut self, pattern: impl Into<String>) -> Self {
        self.name_like = Some(pattern.into());
        self
    }

    pub fn process_instance_id(mut self, id: impl Into<String>) -> Self {
        self.process_instance_id = Some(id.into());
        self
    }

    pub fn execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn task_definition_key(mut self, key: impl Into<String>) -> Self {
        self.task_definition_key = Some(key.into());
        self
    }

    pub fn assignee(mut self, user_id: impl Into<String>) -> Self {
        self.assignee = Some(user_id.into());
        self
    }

    pub fn candidate_user(mut self, user_id: impl Into<String>) -> Self {
        self.candidate_user = Some(user_id.into());
        self
    }

    pub fn candidate_or_assigned(mut self, user_id: impl Into<String>) -> Self {
        self.candidate_or_assigned = Some(user_id.into());
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }

    pub fn matches(&self, t: &Task) -> bool {
        eq_opt(&self.task_id, &t.id)
            && eq_opt(&self.name, &t.name)
            && like_opt(&self.name_like, &t.name)
            && eq_opt(&self.process_instance_id, &t.process_instance_id)
            && eq_opt(&self.process_definition_id, &t.process_definition_id)
            && eq_opt(&self.execution_id, &t.execution_id)
            && eq_opt(&self.task_definition_key, &t.task_definition_key)
            && eq_opt_opt(&self.business_key, &t.business_key)
            && like_opt_opt(&self.business_key_like, &t.business_key)
            && eq_opt_opt(&self.assignee, &t.assignee)
            && like_opt_opt(&self.assignee_like, &t.assignee)
            && self.candidate_user.as_deref().is_none_or(|u| {
                t.assignee.is_none() && t.candidate_users.iter().any(|c| c == u)
            })
            && self
                .candidate_or_assigned
                .as_deref()
                .is_none_or(|u| t.is_candidate_or_assigned(u))
            && (!self.unassigned || t.assignee.is_none())
            && (!self.active || !t.suspended)
            && (!self.suspended || t.suspended)
    }
}

#[async_trait]
impl Criteria for TaskCriteria {
    type Record = Task;

    async fn count(&self, engine: &ProcessEngine) -> Result<u64> {
        engine.tasks.count_tasks(self).await
    }

    async fn list(&self, engine: &ProcessEngine, window: Option<PageWindow>) -> Result<Vec<Task>> {
        engine.tasks.list_tasks(self, window).await
    }
}

// --- HISTORIC TASK ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricTaskCriteria {
    pub task_id: Option<String>,
    pub name_like: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub task_definition_key: Option<String>,
    pub assignee: Option<String>,
    pub assignee_like: Option<String>,
    pub finished: bool,
    pub unfinished: bool,
}

impl HistoricTaskCriteria {
    pub fn process_instance_id(mut self, id: impl Into<String>) -> Self {
        self.process_instance_id = Some(id.into());
        self
    }

    pub fn assignee(mut self, user_id: impl Into<String>) -> Self {
        self.assignee = Some(user_id.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }

    pub fn unfinished(mut self) -> Self {
        self.unfinished = true;
        self
    }

    pub fn matches(&self, t: &HistoricTaskInstance) -> bool {
        eq_opt(&self.task_id, &t.id)
            && like_opt(&self.name_like, &t.name)
            && eq_opt(&self.process_instance_id, &t.process_instance_id)
            && eq_opt(&self.process_definition_id, &t.process_definition_id)
            && eq_opt(&self.task_definition_key, &t.task_definition_key)
            && eq_opt_opt(&self.assignee, &t.assignee)
            && like_opt_opt(&self.assignee_like, &t.assignee)
            && (!self.finished || t.finished)
            && (!self.unfinished || !t.finished)
    }
}

#[async_trait]
impl Criteria for HistoricTaskCriteria {
    type Record = HistoricTaskInstance;

    async fn count(&self, engine: &ProcessEngine) -> Result<u64> {
        engine.history.count_historic_tasks(self).await
    }

    async fn list(&self, engine: &ProcessEngine, window: Option<PageWindow>) -> Result<Vec<HistoricTaskInstance>> {
        engine.history.list_historic_tasks(self, window).await
    }
}

// --- HISTORIC ACTIVITY ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricActivityCriteria {
    pub activity_id: Option<String>,
    pub activity_name_like: Option<String>,
    pub activity_type: Option<String>,
    pub process_instance_id: Option<String>,
    pub process_definition_id: Option<String>,
    pub execution_id: Option<String>,
    pub assignee: Option<String>,
    pub finished: bool,
    pub unfinished: bool,
}

impl HistoricActivityCriteria {
    pub fn process_instance_id(mut self, id: impl Into<String>) -> Self {
        self.process_instance_id = Some(id.into());
        self
    }

    pub fn activity_type(mut self, activity_type: impl Into<String>) -> Self {
        self.activity_type = Some(activity_type.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }

    pub fn matches(&self, a: &HistoricActivityInstance) -> bool {
        eq_opt(&self.activity_id, &a.activity_id)
            && like_opt_opt(&self.activity_name_like, &a.activity_name)
            && eq_opt(&self.activity_type, &a.activity_type)
            && eq_opt(&self.process_instance_id, &a.process_instance_id)
            && eq_opt(&self.process_definition_id, &a.process_definition_id)
            && eq_opt(&self.execution_id, &a.execution_id)
            && eq_opt_opt(&self.assignee, &a.assignee)
            && (!self.finished || a.finished)
            && (!self.unfinished || !a.finished)
    }
}

#[async_trait]
impl Criteria for HistoricActivityCriteria {
    type Record = HistoricActivityInstance;

    async fn count(&self, engine: &ProcessEngine) -> Result<u64> {
        engine.history.count_historic_activities(self).await
    }

    async fn list(&self, engine: &ProcessEngine, window: Option<PageWindow>) -> Result<Vec<HistoricActivityInstance>> {
        engine.history.list_historic_activities(self, window).await
    }
}
