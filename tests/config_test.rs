use std::fs;
use std::sync::Arc;
use taskdesk::config::TaskdeskConfig;
use taskdesk::engine::flow::load_process_model_from_yaml;
use taskdesk::engine::memory::InMemoryEngine;
use taskdesk::engine::model::Task;
use taskdesk::workflow::{
    GroupCandidateResolver, PassthroughCandidateResolver, TaskCandidateResolver, WorkflowContext,
};

fn context() -> WorkflowContext {
    WorkflowContext {
        engine: Arc::new(InMemoryEngine::new()).process_engine(),
        process_instance: None,
        task: Task {
            id: "t-1".to_string(),
            name: "Review".to_string(),
            process_instance_id: "p-1".to_string(),
            process_definition_id: "review:1".to_string(),
            execution_id: "e-1".to_string(),
            task_definition_key: "review".to_string(),
            business_key: None,
            assignee: None,
            candidate_users: Vec::new(),
            local_variables: Default::default(),
            suspended: false,
        },
        flow_element: None,
        current_user_id: Some("alice".to_string()),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn test_defaults_when_sections_missing() {
    let config = TaskdeskConfig::from_yaml_str("{}").expect("Failed to parse config");
    assert_eq!(config, TaskdeskConfig::default());
    assert_eq!(config.query.default_page_size, 10);
    assert_eq!(config.query.max_page_size, 500);
    assert_eq!(config.candidates.group_prefix, "group:");
    assert!(config.models.is_empty());
}

#[test]
fn test_invalid_page_sizes_rejected() {
    assert!(TaskdeskConfig::from_yaml_str("query:\n  max_page_size: 0\n").is_err());
    assert!(TaskdeskConfig::from_yaml_str("query:\n  default_page_size: 50\n  max_page_size: 20\n").is_err());
    assert!(TaskdeskConfig::from_yaml_str("candidates:\n  group_prefix: \"\"\n").is_err());
    assert!(TaskdeskConfig::from_yaml_str("query: [1, 2]").is_err());
}

#[test]
fn test_load_rebases_model_paths() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let model_path = temp_dir.path().join("review.yaml");
    fs::write(
        &model_path,
        "key: review\nnodes:\n  - id: start\n    type: startEvent\n  - id: end\n    type: endEvent\nflows:\n  - source: start\n    target: end\n",
    )
    .expect("Failed to write model");
    let config_path = temp_dir.path().join("taskdesk.yaml");
    fs::write(
        &config_path,
        "query:\n  default_page_size: 25\ncandidates:\n  groups:\n    managers: [bob, carol]\nmodels:\n  - review.yaml\n",
    )
    .expect("Failed to write config");

    let config = TaskdeskConfig::load(&config_path).expect("Failed to load config");
    assert_eq!(config.query.default_page_size, 25);
    assert_eq!(config.query.max_page_size, 500);
    assert_eq!(config.models, vec![model_path.clone()]);

    let model = load_process_model_from_yaml(&config.models[0].to_string_lossy()).expect("Failed to load model");
    let definition = InMemoryEngine::new().deploy(model).expect("Failed to deploy");
    assert_eq!(definition.id, "review:1");

    assert!(TaskdeskConfig::load(temp_dir.path().join("missing.yaml")).is_err());
}

#[tokio::test]
async fn test_passthrough_resolver() {
    let resolver = PassthroughCandidateResolver;
    let resolved = resolver
        .resolve(&context(), &strings(&[" bob ", "", "carol", "bob"]))
        .await
        .expect("Resolve failed");
    assert_eq!(resolved, Some(strings(&["bob", "carol"])));

    let nobody = resolver.resolve(&context(), &strings(&["  "])).await.expect("Resolve failed");
    assert_eq!(nobody, None);
}

#[tokio::test]
async fn test_group_resolver_from_config() {
    let config = TaskdeskConfig::from_yaml_str(
        "candidates:\n  group_prefix: \"role:\"\n  groups:\n    managers: [bob, carol]\n    hr: [dana]\n",
    )
    .expect("Failed to parse config");
    let resolver = GroupCandidateResolver::from_config(&config.candidates);
    assert_eq!(resolver.members("hr"), Some(strings(&["dana"])));

    let resolved = resolver
        .resolve(&context(), &strings(&["role:managers", "carol", "erin", "role:hr", "role:unknown"]))
        .await
        .expect("Resolve failed");
    assert_eq!(resolved, Some(strings(&["bob", "carol", "erin", "dana"])));

    let nobody = resolver
        .resolve(&context(), &strings(&["role:unknown"]))
        .await
        .expect("Resolve failed");
    assert_eq!(nobody, None);
}
