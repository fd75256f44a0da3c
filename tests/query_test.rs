use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use taskdesk::engine::flow::{ProcessModel, ProcessModelBuilder};
use taskdesk::engine::memory::InMemoryEngine;
use taskdesk::engine::model::{HistoricActivityInstance, ProcessDefinition, Task};
use taskdesk::engine::ProcessEngine;
use taskdesk::error::{ErrorKind, WorkflowError};
use taskdesk::query::binding::normalize_field_name;
use taskdesk::query::{
    EntityKind, PagedQueryService, QueryRegistry, Queryable, TaskCriteria, bind,
};

/// Filter shared between task and history pages; not every field applies to both.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskFilter {
    name_like: Option<String>,
    assignee: Option<String>,
    process_instance_id: Option<String>,
    unassigned: Option<bool>,
    colour: Option<String>,
}

fn accounting_model() -> ProcessModel {
    ProcessModelBuilder::new("accounting")
        .start("start")
        .user_task("book").name("Account booking").candidate("carol").build()
        .user_task("audit").name("Audit").assignee("dave").build()
        .end("end")
        .connect("start", "book")
        .connect("start", "audit")
        .connect("book", "end")
        .connect("audit", "end")
        .build()
}

/// Three instances, each with an open "Account booking" and "Audit" task.
async fn setup() -> (ProcessEngine, Arc<QueryRegistry>) {
    let engine = Arc::new(InMemoryEngine::new());
    let definition = engine.deploy(accounting_model()).expect("Failed to deploy");
    let process_engine = engine.process_engine();
    for _ in 0..3 {
        process_engine
            .runtime
            .start_instance(&definition.id, None, Default::default())
            .await
            .expect("Failed to start instance");
    }
    let registry = Arc::new(QueryRegistry::new(process_engine.clone()));
    (process_engine, registry)
}

#[test]
fn test_bind_wraps_like_fields() {
    let mut criteria = TaskCriteria::default();
    let report = bind(&mut criteria, &Task::bindings(), &json!({ "nameLike": "Acc" }));

    assert_eq!(criteria.name_like.as_deref(), Some("%Acc%"));
    assert_eq!(report.applied, vec!["name_like".to_string()]);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_bind_skips_unknown_and_mismatched_fields() {
    let mut criteria = TaskCriteria::default();
    let filter = json!({
        "colour": "red",
        "assignee": "carol",
        "taskDefinitionKey": { "nested": true },
    });
    let report = bind(&mut criteria, &Task::bindings(), &filter);

    assert_eq!(criteria.assignee.as_deref(), Some("carol"));
    assert_eq!(criteria.task_definition_key, None);
    assert_eq!(report.applied, vec!["assignee".to_string()]);
    let mut skipped: Vec<_> = report.skipped.iter().map(|s| s.field.as_str()).collect();
    skipped.sort_unstable();
    assert_eq!(skipped, vec!["colour", "taskDefinitionKey"]);
}

#[test]
fn test_bind_flags_and_empty_values() {
    let mut criteria = TaskCriteria::default();
    let filter = json!({
        "unassigned": true,
        "suspended": false,
        "assignee": "",
        "candidateUser": null,
        "name": [],
    });
    let report = bind(&mut criteria, &Task::bindings(), &filter);

    assert!(criteria.unassigned);
    assert!(!criteria.suspended);
    assert_eq!(criteria, TaskCriteria::default().unassigned());
    assert_eq!(report.applied, vec!["unassigned".to_string()]);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_field_name_normalization() {
    assert_eq!(normalize_field_name("nameLike"), "name_like");
    assert_eq!(normalize_field_name("name_like"), "name_like");
    assert_eq!(normalize_field_name("taskId"), "task_id");
    assert_eq!(normalize_field_name("taskID"), "task_id");
    assert_eq!(normalize_field_name("processInstanceID"), "process_instance_id");
    assert_eq!(normalize_field_name("HTTPServer"), "http_server");
    assert_eq!(normalize_field_name("task_ID"), "task_id");
}

#[test]
fn test_bind_ignores_non_map_filters() {
    let mut criteria = TaskCriteria::default();
    let report = bind(&mut criteria, &Task::bindings(), &json!(["assignee", "carol"]));
    assert_eq!(criteria, TaskCriteria::default());
    assert!(report.applied.is_empty());
}

#[tokio::test]
async fn test_empty_filter_counts_everything() {
    let (engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);

    let unfiltered = engine.task_query().count().await.expect("Count failed");
    assert_eq!(unfiltered, 6);
    assert_eq!(service.count(&TaskFilter::default()).await.expect("Count failed"), unfiltered);
    assert_eq!(service.count(&json!({})).await.expect("Count failed"), unfiltered);
}

#[tokio::test]
async fn test_count_with_filters() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);

    let booking = TaskFilter {
        name_like: Some("Acc".to_string()),
        colour: Some("blue".to_string()),
        ..TaskFilter::default()
    };
    assert_eq!(service.count(&booking).await.expect("Count failed"), 3);

    let dave = TaskFilter {
        assignee: Some("dave".to_string()),
        ..TaskFilter::default()
    };
    assert_eq!(service.count(&dave).await.expect("Count failed"), 3);

    let open = TaskFilter {
        unassigned: Some(true),
        ..TaskFilter::default()
    };
    assert_eq!(service.count(&open).await.expect("Count failed"), 3);
}

#[tokio::test]
async fn test_page_is_bounded() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);
    let filter = TaskFilter::default();

    let first = service.page(&filter, 1, 4).await.expect("Page failed");
    let second = service.page(&filter, 2, 4).await.expect("Page failed");
    let third = service.page(&filter, 3, 4).await.expect("Page failed");
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 2);
    assert!(third.is_empty());

    let mut ids: Vec<_> = first.iter().chain(second.iter()).map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);

    let page = service.page_with_total(&filter, 2, 4).await.expect("Page failed");
    assert_eq!(page.total, 6);
    assert_eq!(page.current, 2);
    assert_eq!(page.size, 4);
    assert_eq!(page.records, second);
}

#[tokio::test]
async fn test_page_empty_when_nothing_matches() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);
    let filter = TaskFilter {
        assignee: Some("nobody".to_string()),
        ..TaskFilter::default()
    };

    assert_eq!(service.count(&filter).await.expect("Count failed"), 0);
    let page = service.page_with_total(&filter, 1, 10).await.expect("Page failed");
    assert_eq!(page.total, 0);
    assert!(page.records.is_empty());
}

#[tokio::test]
async fn test_page_applies_transform() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task, String>::with_transform(registry, |task| task.name.to_uppercase());

    let names = service
        .page(&json!({ "assignee": "dave" }), 1, 10)
        .await
        .expect("Page failed");
    assert_eq!(names, vec!["AUDIT".to_string(); 3]);
}

#[tokio::test]
async fn test_invalid_page_requests() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry).max_page_size(5);

    let err = service.page(&json!({}), 0, 5).await.expect_err("Page 0 should fail");
    assert!(matches!(err, WorkflowError::InvalidPage(_)));
    let err = service.page(&json!({}), 1, 0).await.expect_err("Size 0 should fail");
    assert!(matches!(err, WorkflowError::InvalidPage(_)));
    let err = service.page(&json!({}), 1, 6).await.expect_err("Size 6 should fail");
    assert_eq!(err.kind(), ErrorKind::PreconditionViolation);
}

#[tokio::test]
async fn test_get_by_key() {
    let (engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);
    let audit = engine
        .task_query()
        .filter(|c| c.assignee("dave"))
        .list_page(0, 1)
        .await
        .expect("List failed")
        .remove(0);

    let found = service.get_by_key(&audit.id, "task_id").await.expect("Lookup failed");
    assert_eq!(found, audit);
    let camel = service.get_by_key(&audit.id, "taskId").await.expect("Lookup failed");
    assert_eq!(camel, audit);
    assert_eq!(service.count(&json!({ "taskId": audit.id })).await.expect("Count failed"), 1);

    let err = service.get_by_key(&audit.id, "colour").await.expect_err("Lookup should fail");
    assert!(matches!(
        err,
        WorkflowError::KeyQueryMethodNotFound { kind: EntityKind::Task, ref field } if field == "colour"
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // Flags take no argument, so they cannot serve as a key.
    let err = service.get_by_key(&true, "unassigned").await.expect_err("Lookup should fail");
    assert!(matches!(err, WorkflowError::KeyQueryMethodNotFound { .. }));

    let err = service.get_by_key(&json!({ "id": 1 }), "task_id").await.expect_err("Lookup should fail");
    assert!(matches!(err, WorkflowError::KeyQueryMethodNotFound { .. }));

    let err = service.get_by_key("missing", "task_id").await.expect_err("Lookup should fail");
    assert!(matches!(
        err,
        WorkflowError::RecordNotFound { kind: EntityKind::Task, ref key, .. } if key == "missing"
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_get_by_key_with_several_matches_fails() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<Task>::new(registry);

    let err = service.get_by_key("dave", "assignee").await.expect_err("Lookup should fail");
    assert_eq!(err.kind(), ErrorKind::Engine);
}

#[tokio::test]
async fn test_unregistered_kind() {
    let (engine, _registry) = setup().await;
    let registry = Arc::new(QueryRegistry::empty(engine).register::<ProcessDefinition>());
    assert!(registry.is_registered(EntityKind::ProcessDefinition));
    assert!(!registry.is_registered(EntityKind::Task));

    let tasks = PagedQueryService::<Task>::new(registry.clone());
    let err = tasks.count(&json!({})).await.expect_err("Count should fail");
    assert!(matches!(err, WorkflowError::UnsupportedEntityKind(EntityKind::Task)));
    assert_eq!(err.kind(), ErrorKind::UnsupportedEntityKind);

    let definitions = PagedQueryService::<ProcessDefinition>::new(registry);
    assert_eq!(definitions.count(&json!({})).await.expect("Count failed"), 1);
}

#[tokio::test]
async fn test_definition_latest_version_flag() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.deploy(accounting_model()).expect("Failed to deploy");
    engine.deploy(accounting_model()).expect("Failed to redeploy");
    let registry = Arc::new(QueryRegistry::new(engine.process_engine()));
    let service = PagedQueryService::<ProcessDefinition>::new(registry);

    assert_eq!(service.count(&json!({ "key": "accounting" })).await.expect("Count failed"), 2);
    let latest = service
        .page(&json!({ "keyLike": "account", "latestVersion": true }), 1, 10)
        .await
        .expect("Page failed");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version, 2);
    assert_eq!(latest[0].id, "accounting:2");

    let v1 = service.get_by_key(&1, "version").await.expect("Lookup failed");
    assert_eq!(v1.id, "accounting:1");
}

#[tokio::test]
async fn test_historic_activity_page() {
    let (_engine, registry) = setup().await;
    let service = PagedQueryService::<HistoricActivityInstance>::new(registry);

    let user_tasks = json!({ "activityType": "userTask", "unfinished": true });
    assert_eq!(service.count(&user_tasks).await.expect("Count failed"), 6);

    let starts = service
        .page_with_total(&json!({ "activityType": "startEvent", "finished": true }), 1, 2)
        .await
        .expect("Page failed");
    assert_eq!(starts.total, 3);
    assert_eq!(starts.records.len(), 2);
    assert!(starts.records.iter().all(|a| a.activity_id == "start"));
}

#[test]
fn test_entity_kind_names() {
    for kind in EntityKind::ALL {
        assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        assert_eq!(kind.to_string(), kind.as_str());
    }
    assert_eq!(
        serde_json::to_value(EntityKind::HistoricTaskInstance).expect("Serialize failed"),
        json!("historic-task-instance")
    );
    assert!("workflow".parse::<EntityKind>().is_err());
}
