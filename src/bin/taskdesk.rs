use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskdesk::config::TaskdeskConfig;
use taskdesk::engine::flow::load_process_model_from_yaml;
use taskdesk::engine::memory::InMemoryEngine;
use taskdesk::engine::model::{
    HistoricActivityInstance, HistoricTaskInstance, ProcessDefinition, Task, Variables,
};
use taskdesk::error::WorkflowError;
use taskdesk::query::{EntityKind, PagedQueryService, QueryRegistry, Queryable};
use taskdesk::workflow::{
    GroupCandidateResolver, StartProcessModel, TaskCompleteModel, WorkflowService,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Task orchestration over an in-memory process engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and deploy every process model it lists
    Validate {
        /// Path to the configuration YAML file
        #[arg(long, short)]
        config: PathBuf,

        /// Extra process model files
        #[arg(long, short)]
        model: Vec<PathBuf>,
    },

    /// Execute a YAML script of workflow steps against a fresh engine
    Run {
        /// Path to the configuration YAML file
        #[arg(long, short)]
        config: PathBuf,

        /// Path to the script YAML file
        #[arg(long, short)]
        script: PathBuf,

        /// Stop at the first failing step
        #[arg(long)]
        fail_fast: bool,
    },
}

#[derive(Debug, Deserialize)]
struct Script {
    steps: Vec<Step>,
}

/// Tasks are referred to by their flow node key within the current instance.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Step {
    Start {
        key: String,
        #[serde(default)]
        business_key: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        variables: Variables,
        #[serde(default)]
        candidates: Vec<String>,
    },
    Claim {
        task: String,
        user_id: String,
    },
    Complete {
        task: String,
        user_id: String,
        #[serde(default)]
        variables: Variables,
        #[serde(default)]
        task_variables: Variables,
        #[serde(default)]
        jump_to: Option<String>,
        #[serde(default)]
        candidates: Vec<String>,
    },
    Jump {
        task: String,
        target: String,
    },
    Suspend,
    Activate,
    Tasks,
    Query {
        kind: EntityKind,
        #[serde(default)]
        filter: Value,
        #[serde(default = "first_page")]
        page: usize,
        #[serde(default)]
        size: Option<usize>,
    },
}

fn first_page() -> usize {
    1
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Start { .. } => "start",
            Step::Claim { .. } => "claim",
            Step::Complete { .. } => "complete",
            Step::Jump { .. } => "jump",
            Step::Suspend => "suspend",
            Step::Activate => "activate",
            Step::Tasks => "tasks",
            Step::Query { .. } => "query",
        }
    }
}

struct ScriptRunner {
    config: TaskdeskConfig,
    service: WorkflowService,
    registry: Arc<QueryRegistry>,
    current_instance: Option<String>,
}

impl ScriptRunner {
    fn new(config: TaskdeskConfig, engine: Arc<InMemoryEngine>) -> Self {
        let process_engine = engine.process_engine();
        let resolver = Arc::new(GroupCandidateResolver::from_config(&config.candidates));
        Self {
            service: WorkflowService::with_resolver(process_engine.clone(), resolver),
            registry: Arc::new(QueryRegistry::new(process_engine)),
            config,
            current_instance: None,
        }
    }

    fn instance_id(&self) -> Result<&str> {
        self.current_instance
            .as_deref()
            .ok_or_else(|| anyhow!("No process instance started yet"))
    }

    async fn task_id(&self, task_key: &str) -> Result<String> {
        let instance_id = self.instance_id()?;
        let tasks = self
            .service
            .engine()
            .task_query()
            .filter(|c| c.process_instance_id(instance_id).task_definition_key(task_key))
            .list()
            .await?;
        tasks
            .into_iter()
            .next()
            .map(|t| t.id)
            .ok_or_else(|| anyhow!("No active task `{}` in instance {}", task_key, instance_id))
    }

    async fn execute(&mut self, step: Step) -> Result<Value> {
        match step {
            Step::Start { key, business_key, user_id, variables, candidates } => {
                let model = StartProcessModel {
                    process_definition_key: key,
                    business_key,
                    user_id,
                    variables,
                    candidate_or_assigned: candidates,
                };
                let instance = self.service.start_process(&model).await?;
                self.current_instance = Some(instance.id.clone());
                Ok(serde_json::to_value(instance)?)
            }
            Step::Claim { task, user_id } => {
                let task_id = self.task_id(&task).await?;
                self.service.claim(&task_id, &user_id).await?;
                Ok(json!({ "taskId": task_id, "assignee": user_id }))
            }
            Step::Complete { task, user_id, variables, task_variables, jump_to, candidates } => {
                let model = TaskCompleteModel {
                    task_id: Some(self.task_id(&task).await?),
                    user_id: Some(user_id),
                    variables,
                    task_variables,
                    target_task_key: jump_to,
                    candidate_or_assigned: candidates,
                };
                let outcome = self.service.complete(&model).await?;
                Ok(serde_json::to_value(outcome)?)
            }
            Step::Jump { task, target } => {
                let task_id = self.task_id(&task).await?;
                self.service.jump(&task_id, &target).await?;
                Ok(json!({ "taskId": task_id, "target": target }))
            }
            Step::Suspend => {
                let instance_id = self.instance_id()?.to_string();
                self.service.suspend(&instance_id).await?;
                Ok(json!({ "instanceId": instance_id, "suspended": true }))
            }
            Step::Activate => {
                let instance_id = self.instance_id()?.to_string();
                self.service.activate(&instance_id).await?;
                Ok(json!({ "instanceId": instance_id, "suspended": false }))
            }
            Step::Tasks => {
                let instance_id = self.instance_id()?;
                let tasks = self
                    .service
                    .engine()
                    .task_query()
                    .filter(|c| c.process_instance_id(instance_id))
                    .list()
                    .await?;
                Ok(serde_json::to_value(tasks)?)
            }
            Step::Query { kind, filter, page, size } => {
                let size = size.unwrap_or(self.config.query.default_page_size);
                let value = match kind {
                    EntityKind::ProcessDefinition => self.page::<ProcessDefinition>(&filter, page, size).await?,
                    EntityKind::Task => self.page::<Task>(&filter, page, size).await?,
                    EntityKind::HistoricTaskInstance => {
                        self.page::<HistoricTaskInstance>(&filter, page, size).await?
                    }
                    EntityKind::HistoricActivityInstance => {
                        self.page::<HistoricActivityInstance>(&filter, page, size).await?
                    }
                };
                Ok(value)
            }
        }
    }

    async fn page<R>(&self, filter: &Value, page: usize, size: usize) -> Result<Value, WorkflowError>
    where
        R: Queryable + serde::Serialize,
    {
        let page = PagedQueryService::<R>::new(self.registry.clone())
            .max_page_size(self.config.query.max_page_size)
            .page_with_total(filter, page, size)
            .await?;
        serde_json::to_value(page).map_err(|e| WorkflowError::Engine(e.into()))
    }
}

fn deploy_models(engine: &InMemoryEngine, models: &[PathBuf]) -> Result<Vec<ProcessDefinition>> {
    let mut deployed = Vec::new();
    for path in models {
        let model = load_process_model_from_yaml(&path.to_string_lossy())?;
        let definition = engine
            .deploy(model)
            .with_context(|| format!("Failed to deploy {}", path.display()))?;
        info!(definition_id = %definition.id, path = %path.display(), "Loaded process model");
        deployed.push(definition);
    }
    Ok(deployed)
}

fn load_script(path: &Path) -> Result<Script> {
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script from {}", path.display()))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("Failed to deserialize script from {}", path.display()))
}

fn error_json(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<WorkflowError>() {
        Some(workflow_err) => json!({ "kind": workflow_err.kind(), "message": workflow_err.to_string() }),
        None => json!({ "kind": "script", "message": format!("{:#}", err) }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config, model } => {
            let cfg = TaskdeskConfig::load(&config)?;
            let engine = InMemoryEngine::new();
            let mut models = cfg.models.clone();
            models.extend(model);
            let deployed = deploy_models(&engine, &models)?;
            println!("{}", serde_json::to_string_pretty(&deployed)?);
        }

        Commands::Run { config, script, fail_fast } => {
            let cfg = TaskdeskConfig::load(&config)?;
            let engine = Arc::new(InMemoryEngine::new());
            deploy_models(&engine, &cfg.models)?;
            let script = load_script(&script)?;

            let mut runner = ScriptRunner::new(cfg, engine);
            let mut failures = 0usize;
            for (index, step) in script.steps.into_iter().enumerate() {
                let op = step.name();
                match runner.execute(step).await {
                    Ok(result) => {
                        println!("{}", json!({ "step": index + 1, "op": op, "result": result }));
                    }
                    Err(e) => {
                        error!(step = index + 1, op, error = %e, "Step failed");
                        println!("{}", json!({ "step": index + 1, "op": op, "error": error_json(&e) }));
                        failures += 1;
                        if fail_fast {
                            break;
                        }
                    }
                }
            }
            if failures > 0 {
                return Err(anyhow!("{} step(s) failed", failures));
            }
        }
    }

    Ok(())
}
