use chrono::{TimeZone, Utc};
use inbox_relay::db::{self, DbKind, SessionStore, SqlSessionStore};
use inbox_relay::error::RelayError;
use inbox_relay::types::{GatewayInstance, Session, SupportCredentials};
use sqlx::AnyPool;
use tempfile::TempDir;

async fn create_test_pool(temp_dir: &TempDir) -> (AnyPool, DbKind) {
    sqlx::any::install_default_drivers();
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
    let pool = AnyPool::connect(&db_url).await.unwrap();
    let kind = DbKind::Sqlite;
    db::init_db(&pool, kind).await.unwrap();
    (pool, kind)
}

fn session(id: &str) -> Session {
    Session {
        id: id.to_string(),
        description: "Acme support".to_string(),
        support: SupportCredentials {
            token: "cw-token".to_string(),
            account_id: 3,
            inbox_id: 7,
        },
        gateway: GatewayInstance {
            name: id.to_string(),
            token: "inst-token".to_string(),
        },
        created_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
    }
}

#[tokio::test]
async fn test_init_db_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, kind) = create_test_pool(&temp_dir).await;
    db::init_db(&pool, kind).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM relay_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_insert_and_get_session() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, kind) = create_test_pool(&temp_dir).await;

    db::insert_session(&pool, kind, &session("acme")).await.unwrap();
    let loaded = db::get_session(&pool, kind, "acme").await.unwrap();

    assert_eq!(loaded, Some(session("acme")));
    assert!(db::get_session(&pool, kind, "other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_session() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, kind) = create_test_pool(&temp_dir).await;

    db::insert_session(&pool, kind, &session("acme")).await.unwrap();
    assert!(db::delete_session(&pool, kind, "acme").await.unwrap());
    assert!(!db::delete_session(&pool, kind, "acme").await.unwrap());
    assert!(db::get_session(&pool, kind, "acme").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_duplicate_insert_is_session_exists() {
    let temp_dir = TempDir::new().unwrap();
    let (pool, kind) = create_test_pool(&temp_dir).await;
    let store = SqlSessionStore::new(pool, kind);

    store.insert(&session("acme")).await.unwrap();
    let err = store.insert(&session("acme")).await.unwrap_err();

    assert!(matches!(err, RelayError::SessionExists(_)));
    assert_eq!(store.get("acme").await.unwrap().unwrap().gateway.token, "inst-token");
}

#[tokio::test]
async fn test_store_survives_reconnect() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (pool, kind) = create_test_pool(&temp_dir).await;
        SqlSessionStore::new(pool.clone(), kind)
            .insert(&session("acme"))
            .await
            .unwrap();
        pool.close().await;
    }
    let (pool, kind) = create_test_pool(&temp_dir).await;
    let store = SqlSessionStore::new(pool, kind);
    assert!(store.get("acme").await.unwrap().is_some());
    assert!(store.delete("acme").await.unwrap());
}
