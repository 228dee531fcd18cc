//! Session context persistence
//!
//! Holds the cross-turn conversational state: the symbols the last turn
//! actually used, the last intent, and the turn history. Backed by Postgres
//! when POSTGRES_URL/DATABASE_URL is configured, otherwise in-memory.

use crate::error::AgentError;
use crate::models::{ConversationTurn, IntentKind, Symbol};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Per-session conversational memory. Owned by the orchestration layer and
/// committed at most once per turn, after the turn completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub last_symbols: Vec<Symbol>,
    pub last_intent: Option<IntentKind>,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed turn. `symbols` must be the symbols the pipeline
    /// actually used, not merely what the classifier extracted.
    pub fn record_turn(&mut self, turn: ConversationTurn) {
        self.last_symbols = turn.symbols.clone();
        self.last_intent = Some(turn.intent);
        self.turns.push(turn);
    }
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: Uuid) -> crate::Result<SessionContext>;
    async fn save(&self, session_id: Uuid, context: &SessionContext) -> crate::Result<()>;
}

/// In-memory session store for development and tests
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionContext>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: Uuid) -> crate::Result<SessionContext> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id).cloned().unwrap_or_default())
    }

    async fn save(&self, session_id: Uuid, context: &SessionContext) -> crate::Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, context.clone());
        Ok(())
    }
}

/// Postgres-backed session store; one row per session, context stored as
/// a JSON text column.
pub struct PostgresSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> crate::Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_context (
                      session_id UUID PRIMARY KEY,
                      context TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::Session(format!("Failed to initialize session schema: {}", e))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn load(&self, session_id: Uuid) -> crate::Result<SessionContext> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT context FROM session_context WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::Session(format!("Failed to load session: {}", e)))?;

        let Some(row) = row else {
            return Ok(SessionContext::new());
        };

        let raw: String = row
            .try_get("context")
            .map_err(|e| AgentError::Session(format!("Malformed session row: {}", e)))?;

        match serde_json::from_str(&raw) {
            Ok(context) => Ok(context),
            Err(e) => {
                warn!("Discarding unreadable session context: {}", e);
                Ok(SessionContext::new())
            }
        }
    }

    async fn save(&self, session_id: Uuid, context: &SessionContext) -> crate::Result<()> {
        self.ensure_schema().await?;

        let raw = serde_json::to_string(context)?;

        sqlx::query(
            r#"
            INSERT INTO session_context (session_id, context, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (session_id)
            DO UPDATE SET context = EXCLUDED.context, updated_at = NOW()
            "#,
        )
        .bind(session_id)
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Session(format!("Failed to save session: {}", e)))?;

        Ok(())
    }
}

/// Build a session store from the environment: Postgres when a database URL
/// is configured and the pool can be created, in-memory otherwise.
pub fn build_session_store() -> Arc<dyn SessionStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("Session store backend: postgres");
                return Arc::new(PostgresSessionStore::new(pool));
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres session store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Session store backend: in-memory");
    Arc::new(InMemorySessionStore::new())
}
