use anyhow::{Context as AnyhowContext, Result, anyhow};
use evalexpr::{ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, eval_boolean_with_context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;

use crate::engine::model::Variables;

/// Deployable process model: flow nodes plus the sequence flows joining them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessModel {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<FlowElement>,
    #[serde(default)]
    pub flows: Vec<SequenceFlow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowElement {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: FlowElementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FlowElementKind {
    StartEvent,
    UserTask {
        /// Static assignee, may reference an instance variable as `${name}`.
        #[serde(default)]
        assignee: Option<String>,
        #[serde(default)]
        candidate_users: Vec<String>,
    },
    EndEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub source: String,
    pub target: String,
    /// Boolean expression over instance variables; absent means always taken.
    #[serde(default)]
    pub condition: Option<String>,
}

impl FlowElement {
    pub fn is_user_task(&self) -> bool {
        matches!(self.kind, FlowElementKind::UserTask { .. })
    }

    /// Statically defined candidate users; empty for anything but a user task.
    pub fn candidate_users(&self) -> &[String] {
        match &self.kind {
            FlowElementKind::UserTask { candidate_users, .. } => candidate_users,
            _ => &[],
        }
    }

    pub fn activity_type(&self) -> &'static str {
        match self.kind {
            FlowElementKind::StartEvent => "startEvent",
            FlowElementKind::UserTask { .. } => "userTask",
            FlowElementKind::EndEvent => "endEvent",
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl ProcessModel {
    pub fn flow_element(&self, id: &str) -> Option<&FlowElement> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_event(&self) -> Option<&FlowElement> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, FlowElementKind::StartEvent))
    }

    pub fn outgoing<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a SequenceFlow> + 'a {
        self.flows.iter().filter(move |f| f.source == source)
    }

    /// Rejects duplicate node ids, a missing or repeated start event, and
    /// flows pointing at unknown nodes.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(anyhow!("Process model key must not be empty"));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(anyhow!("Duplicate node ID: {}", node.id));
            }
        }

        let starts = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, FlowElementKind::StartEvent))
            .count();
        match starts {
            0 => return Err(anyhow!("Start event not found in process model {}", self.key)),
            1 => {}
            _ => return Err(anyhow!("Multiple start events in process model {}", self.key)),
        }

        for flow in &self.flows {
            if !ids.contains(flow.source.as_str()) {
                return Err(anyhow!("Source node not found: {}", flow.source));
            }
            if !ids.contains(flow.target.as_str()) {
                return Err(anyhow!("Target node not found: {}", flow.target));
            }
        }
        Ok(())
    }
}

pub fn load_process_model_from_yaml(file_path: &str) -> Result<ProcessModel> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read process model from {}", file_path))?;

    let model: ProcessModel = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize process model from {}", file_path))?;

    model.validate()?;
    Ok(model)
}

/// Evaluates a sequence-flow condition against instance variables.
pub fn evaluate_condition(expression: &str, variables: &Variables) -> Result<bool> {
    let expression = expression.replace("${", "").replace('}', "");
    let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
    for (k, v) in variables {
        let eval_val = match v {
            Value::String(s) => Some(evalexpr::Value::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(evalexpr::Value::Int(i))
                } else {
                    n.as_f64().map(evalexpr::Value::Float)
                }
            }
            Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
            _ => None,
        };
        if let Some(ev) = eval_val {
            let _ = eval_ctx.set_value(k.clone(), ev);
        }
    }

    eval_boolean_with_context(&expression, &eval_ctx)
        .map_err(|e| anyhow!("Failed to evaluate flow condition `{}`: {}", expression, e))
}

/// Replaces a whole-value `${name}` reference with the named string variable.
pub fn substitute_expression(raw: &str, variables: &Variables) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(name) => match variables.get(name.trim()) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
        None if trimmed.is_empty() => None,
        None => Some(trimmed.to_string()),
    }
}

pub struct ProcessModelBuilder {
    key: String,
    name: String,
    nodes: Vec<FlowElement>,
    flows: Vec<SequenceFlow>,
}

impl ProcessModelBuilder {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            nodes: Vec::new(),
            flows: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn start(mut self, id: &str) -> Self {
        self.nodes.push(FlowElement {
            id: id.to_string(),
            name: None,
            kind: FlowElementKind::StartEvent,
        });
        self
    }

    pub fn end(mut self, id: &str) -> Self {
        self.nodes.push(FlowElement {
            id: id.to_string(),
            name: None,
            kind: FlowElementKind::EndEvent,
        });
        self
    }

    pub fn user_task(self, id: &str) -> UserTaskBuilder {
        UserTaskBuilder {
            model_builder: self,
            id: id.to_string(),
            name: None,
            assignee: None,
            candidate_users: Vec::new(),
        }
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.flows.push(SequenceFlow {
            source: source.to_string(),
            target: target.to_string(),
            condition: None,
        });
        self
    }

    pub fn connect_if(mut self, source: &str, target: &str, condition: &str) -> Self {
        self.flows.push(SequenceFlow {
            source: source.to_string(),
            target: target.to_string(),
            condition: Some(condition.to_string()),
        });
        self
    }

    pub fn build(self) -> ProcessModel {
        ProcessModel {
            key: self.key,
            name: self.name,
            nodes: self.nodes,
            flows: self.flows,
        }
    }
}

pub struct UserTaskBuilder {
    model_builder: ProcessModelBuilder,
    id: String,
    name: Option<String>,
    assignee: Option<String>,
    candidate_users: Vec<String>,
}

impl UserTaskBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }

    pub fn candidate(mut self, user_id: &str) -> Self {
        self.candidate_users.push(user_id.to_string());
        self
    }

    pub fn build(mut self) -> ProcessModelBuilder {
        self.model_builder.nodes.push(FlowElement {
            id: self.id,
            name: self.name,
            kind: FlowElementKind::UserTask {
                assignee: self.assignee,
                candidate_users: self.candidate_users,
            },
        });
        self.model_builder
    }
}
