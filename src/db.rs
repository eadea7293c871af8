use crate::error::RelayError;
use crate::types::{GatewayInstance, Session, SupportCredentials};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

pub fn db_kind_from_url(url: &str) -> DbKind {
    let lower = url.to_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        DbKind::Postgres
    } else {
        DbKind::Sqlite
    }
}

pub fn rewrite_sql(sql: &str, kind: DbKind) -> Cow<'_, str> {
    match kind {
        DbKind::Sqlite => Cow::Borrowed(sql),
        DbKind::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut idx = 1;
            for ch in sql.chars() {
                if ch == '?' {
                    out.push('$');
                    out.push_str(&idx.to_string());
                    idx += 1;
                } else {
                    out.push(ch);
                }
            }
            Cow::Owned(out)
        }
    }
}

/// Record lookup by session id. Implementations must be safe for concurrent use.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, RelayError>;
    async fn insert(&self, session: &Session) -> Result<(), RelayError>;
    /// Returns whether a record was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, RelayError>;
}

#[derive(Clone)]
pub struct SqlSessionStore {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlSessionStore {
    pub fn new(pool: AnyPool, kind: DbKind) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, RelayError> {
        Ok(get_session(&self.pool, self.kind, session_id).await?)
    }

    async fn insert(&self, session: &Session) -> Result<(), RelayError> {
        insert_session(&self.pool, self.kind, session)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RelayError::SessionExists(session.id.clone())
                }
                other => RelayError::from(other),
            })
    }

    async fn delete(&self, session_id: &str) -> Result<bool, RelayError> {
        Ok(delete_session(&self.pool, self.kind, session_id).await?)
    }
}

fn i64_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

pub async fn init_db(pool: &AnyPool, kind: DbKind) -> Result<(), sqlx::Error> {
    let stmts = [r#"CREATE TABLE IF NOT EXISTS relay_sessions (
            session_id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            support_token TEXT NOT NULL,
            support_account_id BIGINT NOT NULL,
            support_inbox_id BIGINT NOT NULL,
            gateway_instance TEXT NOT NULL,
            gateway_token TEXT NOT NULL,
            created_at BIGINT NOT NULL
        )"#];

    for stmt in stmts {
        let sql = rewrite_sql(stmt, kind);
        sqlx::query(sql.as_ref()).execute(pool).await?;
    }
    Ok(())
}

pub async fn insert_session(pool: &AnyPool, kind: DbKind, session: &Session) -> Result<(), sqlx::Error> {
    let sql = rewrite_sql(
        r#"INSERT INTO relay_sessions (
            session_id, description, support_token, support_account_id, support_inbox_id,
            gateway_instance, gateway_token, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&session.id)
        .bind(&session.description)
        .bind(&session.support.token)
        .bind(session.support.account_id)
        .bind(session.support.inbox_id)
        .bind(&session.gateway.name)
        .bind(&session.gateway.token)
        .bind(session.created_at.timestamp())
        .execute(pool)
        .await?;
    Ok(())
}

fn session_from_row(row: &AnyRow) -> Result<Session, sqlx::Error> {
    let created_at: i64 = row.try_get("created_at")?;
    Ok(Session {
        id: row.try_get("session_id")?,
        description: row.try_get("description")?,
        support: SupportCredentials {
            token: row.try_get("support_token")?,
            account_id: row.try_get("support_account_id")?,
            inbox_id: row.try_get("support_inbox_id")?,
        },
        gateway: GatewayInstance {
            name: row.try_get("gateway_instance")?,
            token: row.try_get("gateway_token")?,
        },
        created_at: i64_to_datetime(created_at),
    })
}

pub async fn get_session(pool: &AnyPool, kind: DbKind, session_id: &str) -> Result<Option<Session>, sqlx::Error> {
    let sql = rewrite_sql(
        r#"SELECT session_id, description, support_token, support_account_id, support_inbox_id,
                  gateway_instance, gateway_token, created_at
           FROM relay_sessions WHERE session_id = ?"#,
        kind,
    );
    let row = sqlx::query(sql.as_ref())
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(session_from_row).transpose()
}

pub async fn delete_session(pool: &AnyPool, kind: DbKind, session_id: &str) -> Result<bool, sqlx::Error> {
    let sql = rewrite_sql("DELETE FROM relay_sessions WHERE session_id = ?", kind);
    let result = sqlx::query(sql.as_ref()).bind(session_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
