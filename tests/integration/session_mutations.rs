//! Library, settings and provider mutations through a sync session

use super::test_utils::settle;
use factory_sync::backend::{ops, MemoryBackend};
use factory_sync::catalog::{
    CatalogEntity, CatalogKind, CatalogRecord, CustomPayload, EntitySource, NewPersona,
    NewWorkflow,
};
use factory_sync::config::SyncConfig;
use factory_sync::query::QueryStatus;
use factory_sync::types::{AiProvider, AppSettings};
use factory_sync::{BackendError, Query, SyncSession};
use std::collections::HashMap;
use std::sync::Arc;

fn session() -> (Arc<MemoryBackend>, SyncSession) {
    let backend = Arc::new(MemoryBackend::demo());
    let session = SyncSession::new(backend.clone(), &SyncConfig::default());
    (backend, session)
}

fn persona(name: &str, role: &str) -> CustomPayload {
    CustomPayload::Persona(NewPersona {
        name: name.to_string(),
        role: role.to_string(),
        expertise: "Distributed systems".to_string(),
        mental_models: vec!["Everything fails".to_string()],
        core_capabilities: vec![],
        layer: String::new(),
    })
}

async fn load_library(session: &SyncSession, kind: CatalogKind) {
    let queries = [
        Query::Catalog(kind),
        Query::CustomCatalog(kind),
        Query::LibraryToggles,
    ];
    for query in queries {
        session.fetch(&query).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_custom_persona_appears_after_base_entries() {
    let (_backend, session) = session();
    let custom = Query::CustomCatalog(CatalogKind::Persona);
    let _sub = session.watch(custom.clone());
    load_library(&session, CatalogKind::Persona).await;
    let base_len = session.library(CatalogKind::Persona).unwrap().unwrap().len();

    let entity = session
        .add_custom_entity(persona("Grace", "Staff Engineer"))
        .await
        .unwrap();
    assert_eq!(entity.id(), "custom:staff-engineer-grace");
    settle(session.cache(), &custom.key()).await;

    let library = session.library(CatalogKind::Persona).unwrap().unwrap();
    assert_eq!(library.len(), base_len + 1);
    let last = library.last().unwrap();
    assert_eq!(last.source, EntitySource::Custom);
    assert_eq!(last.item.id(), "custom:staff-engineer-grace");
    assert!(library[..base_len]
        .iter()
        .all(|entry| entry.source == EntitySource::Base));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payload_never_reaches_backend() {
    let (backend, session) = session();
    let err = session
        .add_custom_entity(persona("", "Staff Engineer"))
        .await
        .unwrap_err();
    assert_eq!(
        err.backend(),
        Some(&BackendError::Validation("name is required".to_string()))
    );

    let err = session
        .add_custom_entity(CustomPayload::Workflow(NewWorkflow {
            name: "Empty".to_string(),
            description: String::new(),
            chain: vec![],
            convergence_cycles: 1,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::Validation(_))));
    assert_eq!(backend.calls(ops::ADD_CUSTOM_ENTITY), 0);
}

#[tokio::test(start_paused = true)]
async fn test_update_and_remove_custom_entity() {
    let (_backend, session) = session();
    let created = session
        .add_custom_entity(persona("Grace", "Staff Engineer"))
        .await
        .unwrap();

    let updated = session
        .update_custom_entity(created.id(), persona("Grace", "Principal Engineer"))
        .await
        .unwrap();
    assert_eq!(updated.id(), created.id());
    match &updated {
        CatalogEntity::Persona(info) => assert_eq!(info.role, "Principal Engineer"),
        other => panic!("expected persona, got {:?}", other),
    }

    session
        .remove_custom_entity(CatalogKind::Persona, created.id())
        .await
        .unwrap();
    let custom: Vec<CatalogEntity> = session
        .fetch_as(&Query::CustomCatalog(CatalogKind::Persona))
        .await
        .unwrap();
    assert!(custom.is_empty());

    let err = session
        .remove_custom_entity(CatalogKind::Persona, created.id())
        .await
        .unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_toggle_flags_without_removing() {
    let (_backend, session) = session();
    let toggles = Query::LibraryToggles;
    let _sub = session.watch(toggles.clone());
    load_library(&session, CatalogKind::Skill).await;

    session
        .toggle_library_item(CatalogKind::Skill, "tdd", false)
        .await
        .unwrap();
    settle(session.cache(), &toggles.key()).await;

    let library = session.library(CatalogKind::Skill).unwrap().unwrap();
    let tdd = library.iter().find(|e| e.item.id() == "tdd").unwrap();
    assert!(!tdd.enabled);
    assert!(library
        .iter()
        .filter(|e| e.item.id() != "tdd")
        .all(|e| e.enabled));
}

#[tokio::test(start_paused = true)]
async fn test_provider_lifecycle_refreshes_settings() {
    let (_backend, session) = session();
    let settings_query = Query::Settings;
    let _sub = session.watch(settings_query.clone());
    settle(session.cache(), &settings_query.key()).await;

    let provider = AiProvider {
        id: "local".to_string(),
        name: "Local".to_string(),
        provider_type: "openai".to_string(),
        api_key: String::new(),
        api_base_url: "http://localhost:11434/v1".to_string(),
        default_model: "qwen".to_string(),
        enabled: true,
        is_healthy: true,
        last_error: None,
        engine: "codex".to_string(),
        extra_headers: HashMap::new(),
    };
    session.add_provider(provider.clone()).await.unwrap();
    settle(session.cache(), &settings_query.key()).await;
    let settings: AppSettings = session.view(&settings_query).unwrap().data.unwrap();
    assert!(settings.providers.iter().any(|p| p.id == "local"));

    let err = session.add_provider(provider).await.unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::Validation(_))));

    session.remove_provider("local").await.unwrap();
    settle(session.cache(), &settings_query.key()).await;
    let settings: AppSettings = session.view(&settings_query).unwrap().data.unwrap();
    assert!(settings.providers.iter().all(|p| p.id != "local"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_running_project_is_rejected() {
    let (_backend, session) = session();
    session.start("acme", "claude", "sonnet").await.unwrap();
    let err = session.delete_project("acme").await.unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::Rejected(_))));

    session.stop("acme").await.unwrap();
    session.delete_project("acme").await.unwrap();
    let err = session.fetch(&Query::status("acme")).await.unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_transient_backend_error_surfaces_after_one_retry() {
    let (backend, session) = session();
    let status = Query::status("acme");
    session.fetch(&status).await.unwrap();

    backend.fail_next(ops::STATUS, BackendError::Transient("backend restarting".to_string()));
    backend.fail_next(ops::STATUS, BackendError::Transient("backend restarting".to_string()));
    let err = session.refetch(&status).await.unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::Transient(_))));

    let entry = session.read(&status);
    assert_eq!(entry.status, QueryStatus::Error);
    assert!(entry.data.is_some());
    assert_eq!(backend.calls(ops::STATUS), 3);

    // Manual refetch is always available after an error
    session.refetch(&status).await.unwrap();
    assert_eq!(session.read(&status).status, QueryStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_settings_validation_is_local() {
    let (backend, session) = session();
    let settings = AppSettings {
        default_model: " ".to_string(),
        ..AppSettings::default()
    };
    let err = session.save_settings(settings).await.unwrap_err();
    assert!(matches!(err.backend(), Some(BackendError::Validation(_))));
    assert_eq!(backend.calls(ops::SAVE_SETTINGS), 0);
}
