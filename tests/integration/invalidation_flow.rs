//! Mutation-driven invalidation through a sync session

use super::test_utils::settle;
use factory_sync::backend::{ops, MemoryBackend};
use factory_sync::config::SyncConfig;
use factory_sync::query::QueryStatus;
use factory_sync::types::{Project, ProjectStatus, RuntimeStatus};
use factory_sync::{Query, SyncSession};
use std::sync::Arc;

fn demo_session() -> (Arc<MemoryBackend>, SyncSession) {
    let backend = Arc::new(MemoryBackend::demo());
    let session = SyncSession::new(backend.clone(), &SyncConfig::default());
    (backend, session)
}

#[tokio::test(start_paused = true)]
async fn test_start_refetches_observed_status_and_projects() {
    let (backend, session) = demo_session();
    let status = Query::status("acme");
    let _status_sub = session.watch(status.clone());
    let _projects_sub = session.watch(Query::Projects);
    settle(session.cache(), &status.key()).await;
    settle(session.cache(), &Query::Projects.key()).await;
    assert_eq!(backend.calls(ops::STATUS), 1);

    let output = session.start("acme", "claude", "sonnet").await.unwrap();
    assert_eq!(output.invalidation.marked.len(), 2);
    assert_eq!(output.invalidation.refetched.len(), 2);

    // Both keys are refreshing (or already refreshed) when start returns
    for key in [status.key(), Query::Projects.key()] {
        let entry = session.cache().peek(&key).unwrap();
        assert!(
            matches!(entry.status, QueryStatus::Loading | QueryStatus::Success),
            "unexpected status {:?} for {}",
            entry.status,
            key
        );
        assert!(entry.request_generation >= 2);
    }

    settle(session.cache(), &status.key()).await;
    let runtime: RuntimeStatus = session.view(&status).unwrap().data.unwrap();
    assert!(runtime.is_running);
    let projects: Vec<Project> = session.view(&Query::Projects).unwrap().data.unwrap();
    assert_eq!(projects[0].status, ProjectStatus::Running);
    assert_eq!(backend.calls(ops::STATUS), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_keys_are_marked_not_refetched() {
    let (backend, session) = demo_session();
    let status = Query::status("acme");
    session.fetch(&status).await.unwrap();

    let output = session.stop("acme").await.unwrap();
    assert_eq!(output.invalidation.marked, vec![status.key()]);
    assert!(output.invalidation.refetched.is_empty());

    let entry = session.cache().peek(&status.key()).unwrap();
    assert!(entry.is_stale);
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(backend.calls(ops::STATUS), 1);

    // The next read pays for the refresh
    session.fetch(&status).await.unwrap();
    assert_eq!(backend.calls(ops::STATUS), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_mutation_invalidates_nothing() {
    let (backend, session) = demo_session();
    let status = Query::status("acme");
    let _sub = session.watch(status.clone());
    settle(session.cache(), &status.key()).await;

    session.start("acme", "claude", "sonnet").await.unwrap();
    settle(session.cache(), &status.key()).await;
    let calls = backend.calls(ops::STATUS);

    let err = session.start("acme", "claude", "sonnet").await.unwrap_err();
    assert!(matches!(
        err.backend(),
        Some(factory_sync::BackendError::Rejected(_))
    ));
    assert!(!session.cache().peek(&status.key()).unwrap().is_stale);
    assert!(!session.cache().is_fetching(&status.key()));
    assert_eq!(backend.calls(ops::STATUS), calls);
}

#[tokio::test(start_paused = true)]
async fn test_override_change_refreshes_effective_config() {
    let (_backend, session) = demo_session();
    let override_query = Query::Override("acme".to_string());
    let _settings = session.watch(Query::Settings);
    let _override = session.watch(override_query.clone());
    settle(session.cache(), &Query::Settings.key()).await;
    settle(session.cache(), &override_query.key()).await;

    let before = session.effective_config("acme").unwrap().unwrap();
    assert_eq!(before.engine, "claude");

    session
        .set_override(
            "acme",
            factory_sync::overrides::RuntimeOverride::default().with_model("opus"),
        )
        .await
        .unwrap();
    settle(session.cache(), &override_query.key()).await;

    let after = session.effective_config("acme").unwrap().unwrap();
    assert_eq!(after.engine, "claude");
    assert_eq!(after.model, "opus");
    let resolved = session.resolved_runtime("acme").unwrap().unwrap();
    assert_eq!(resolved.resolved_model, factory_sync::overrides::resolve_model_id("opus"));
    assert_eq!(resolved.provider_name, "Anthropic");
}
