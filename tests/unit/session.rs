#[path = "../support/mod.rs"]
mod support;

use inbox_relay::error::RelayError;
use inbox_relay::session::SessionRegistry;
use std::sync::Arc;
use support::{credentials, sample_session, FakeGateway, MemoryStore, PUBLIC_URL};

fn registry(store: &Arc<MemoryStore>, gateway: &Arc<FakeGateway>) -> SessionRegistry {
    SessionRegistry::new(store.clone(), gateway.clone(), PUBLIC_URL)
}

#[tokio::test]
async fn test_create_provisions_and_registers_webhook() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());

    let session = registry(&store, &gateway)
        .create(Some("acme"), "Acme support", credentials())
        .await
        .unwrap();

    assert_eq!(session.id, "acme");
    assert_eq!(session.gateway.token, "tok-acme");
    assert!(store.contains("acme"));
    assert_eq!(
        gateway.calls(),
        vec![
            "create_instance:acme".to_string(),
            "set_webhook:acme:https://relay.test/gateway/webhook/acme".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_create_without_id_generates_one() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());

    let session = registry(&store, &gateway)
        .create(None, "", credentials())
        .await
        .unwrap();

    assert_eq!(session.id.len(), 36);
    assert!(store.contains(&session.id));
}

#[tokio::test]
async fn test_create_existing_id_conflicts_without_provisioning() {
    let store = Arc::new(MemoryStore::with(&[sample_session("acme")]));
    let gateway = Arc::new(FakeGateway::default());

    let err = registry(&store, &gateway)
        .create(Some("acme"), "again", credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::SessionExists(_)));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_create_rejects_bad_id_and_credentials() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());
    let registry = registry(&store, &gateway);

    let err = registry.create(Some("a b"), "", credentials()).await.unwrap_err();
    assert!(matches!(err, RelayError::Validation(_)));

    let mut creds = credentials();
    creds.token.clear();
    let err = registry.create(Some("ok"), "", creds).await.unwrap_err();
    assert!(matches!(err, RelayError::Validation(_)));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_create_rolls_back_when_webhook_fails() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway {
        fail_set_webhook: true,
        ..Default::default()
    });

    let err = registry(&store, &gateway)
        .create(Some("acme"), "", credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Upstream(_)));
    assert!(!store.contains("acme"));
    assert!(gateway.called("delete_instance:acme"));
}

#[tokio::test]
async fn test_create_rolls_back_instance_when_store_fails() {
    let store = Arc::new(MemoryStore {
        fail_insert: true,
        ..Default::default()
    });
    let gateway = Arc::new(FakeGateway::default());

    let err = registry(&store, &gateway)
        .create(Some("acme"), "", credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Storage(_)));
    assert!(gateway.called("delete_instance:acme"));
    assert!(!gateway.called("set_webhook"));
}

#[tokio::test]
async fn test_get_unknown_is_not_found() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());
    let err = registry(&store, &gateway).get("nope").await.unwrap_err();
    assert!(matches!(err, RelayError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_runs_logout_then_delete_then_local() {
    let store = Arc::new(MemoryStore::with(&[sample_session("acme")]));
    let gateway = Arc::new(FakeGateway::default());

    let report = registry(&store, &gateway).delete("acme").await.unwrap();

    assert!(report.warning.is_none());
    assert!(!store.contains("acme"));
    assert_eq!(
        gateway.calls(),
        vec!["logout_instance:acme".to_string(), "delete_instance:acme".to_string()]
    );
}

#[tokio::test]
async fn test_delete_removes_local_record_even_if_logout_fails() {
    let store = Arc::new(MemoryStore::with(&[sample_session("acme")]));
    let gateway = Arc::new(FakeGateway {
        fail_logout: true,
        ..Default::default()
    });

    let report = registry(&store, &gateway).delete("acme").await.unwrap();

    assert!(report.warning.unwrap().contains("logout failed"));
    assert!(gateway.called("delete_instance:acme"));
    assert!(!store.contains("acme"));
}

#[tokio::test]
async fn test_connect_and_status_proxy_gateway() {
    let store = Arc::new(MemoryStore::with(&[sample_session("acme")]));
    let gateway = Arc::new(FakeGateway::default());
    let registry = registry(&store, &gateway);

    assert!(registry.connect("acme").await.unwrap().contains("base64"));
    assert_eq!(registry.status("acme").await.unwrap().connection_status, "open");
    assert!(matches!(registry.connect("other").await, Err(RelayError::NotFound(_))));
}
