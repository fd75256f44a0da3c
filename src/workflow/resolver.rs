use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::CandidateConfig;
use crate::workflow::model::WorkflowContext;

/// Turns raw candidate entries into concrete user ids.
///
/// `Ok(None)` means nothing could be resolved; the task is then left without
/// assignee or candidates. Implementations only read, they never write to the
/// engine.
#[async_trait]
pub trait TaskCandidateResolver: Send + Sync {
    async fn resolve(&self, ctx: &WorkflowContext, raw: &[String]) -> Result<Option<Vec<String>>>;
}

fn push_unique(out: &mut Vec<String>, user: &str) {
    let user = user.trim();
    if !user.is_empty() && !out.iter().any(|u| u == user) {
        out.push(user.to_string());
    }
}

/// Treats every raw entry as a user id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCandidateResolver;

#[async_trait]
impl TaskCandidateResolver for PassthroughCandidateResolver {
    async fn resolve(&self, _ctx: &WorkflowContext, raw: &[String]) -> Result<Option<Vec<String>>> {
        let mut users = Vec::new();
        for entry in raw {
            push_unique(&mut users, entry);
        }
        Ok((!users.is_empty()).then_some(users))
    }
}

/// Expands `group:<name>` entries through a group directory.
pub struct GroupCandidateResolver {
    prefix: String,
    groups: DashMap<String, Vec<String>>,
}

impl GroupCandidateResolver {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            groups: DashMap::new(),
        }
    }

    pub fn from_config(config: &CandidateConfig) -> Self {
        let resolver = Self::new(&config.group_prefix);
        for (group, members) in &config.groups {
            resolver.set_group(group, members.clone());
        }
        resolver
    }

    pub fn set_group(&self, group: &str, members: Vec<String>) {
        self.groups.insert(group.to_string(), members);
    }

    pub fn members(&self, group: &str) -> Option<Vec<String>> {
        self.groups.get(group).map(|m| m.clone())
    }
}

#[async_trait]
impl TaskCandidateResolver for GroupCandidateResolver {
    async fn resolve(&self, ctx: &WorkflowContext, raw: &[String]) -> Result<Option<Vec<String>>> {
        let mut users = Vec::new();
        for entry in raw {
            let Some(group) = entry.trim().strip_prefix(self.prefix.as_str()) else {
                push_unique(&mut users, entry);
                continue;
            };
            match self.groups.get(group) {
                Some(members) => {
                    debug!(task_id = %ctx.task.id, group, members = members.len(), "Expanded candidate group");
                    for member in members.iter() {
                        push_unique(&mut users, member);
                    }
                }
                None => warn!(task_id = %ctx.task.id, group, "Unknown candidate group"),
            }
        }
        Ok((!users.is_empty()).then_some(users))
    }
}
