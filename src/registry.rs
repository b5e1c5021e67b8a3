//! Session Registry (spec §4.C) — tracks every live [`SshSession`],
//! hands out ids, and reaps idle sessions.
//!
//! Grounded in the teacher's `TerminalManager`/`ConnectionManager` map
//! pattern (an `Arc<RwLock<HashMap<...>>>` of handles), extended with
//! the 10s connect deadline and 30-minute idle eviction from spec §4.C.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::session::{
    generate_session_id, AuthType, ConnectRequest, IDLE_EVICTION_AGE, SessionId, SessionStatus,
    SshSession,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(rename = "sessionId")]
    pub id: SessionId,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    pub status: String,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SshSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        });
        spawn_idle_eviction(registry.clone());
        registry
    }

    pub async fn connect(&self, req: ConnectRequest) -> Arc<SshSession> {
        let id = generate_session_id();
        let session = Arc::new(SshSession::connect(id.clone(), req).await);
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    /// Looks a session up and touches its activity clock, per spec §4.C
    /// ("any read via `get` must update `lastActivityAt`").
    pub async fn get(&self, id: &str) -> Option<Arc<SshSession>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?.clone();
        session.touch();
        Some(session)
    }

    pub async fn status(&self, id: &str) -> Option<SessionStatus> {
        self.get(id).await.map(|s| s.status())
    }

    pub async fn disconnect(&self, id: &str) -> bool {
        let session = self.sessions.write().await.remove(id);
        if let Some(session) = session {
            session.disconnect().await;
            true
        } else {
            false
        }
    }

    pub async fn active_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .map(|s| {
                let meta = s.meta.lock().unwrap();
                SessionSummary {
                    id: meta.id.clone(),
                    host: meta.host.clone(),
                    port: meta.port,
                    username: meta.username.clone(),
                    auth_type: meta.auth_type,
                    status: meta.status.as_str().to_string(),
                }
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, session) in sessions.drain() {
            session.disconnect().await;
        }
    }

    async fn evict_idle(&self) {
        let stale: Vec<SessionId> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.last_activity_age() >= IDLE_EVICTION_AGE)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in stale {
            tracing::info!(session_id = %id, "evicting idle session");
            self.disconnect(&id).await;
        }
    }
}

fn spawn_idle_eviction(registry: Arc<SessionRegistry>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            registry.evict_idle().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthConfig;

    #[tokio::test]
    async fn connect_registers_and_get_touches_activity() {
        let registry = SessionRegistry::new();
        let session = registry
            .connect(ConnectRequest {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "nobody".to_string(),
                auth: AuthConfig::Password("x".to_string()),
            })
            .await;

        let found = registry.get(&session.id).await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn disconnect_removes_from_registry() {
        let registry = SessionRegistry::new();
        let session = registry
            .connect(ConnectRequest {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "nobody".to_string(),
                auth: AuthConfig::Password("x".to_string()),
            })
            .await;

        assert!(registry.disconnect(&session.id).await);
        assert!(registry.get(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn disconnect_on_unknown_id_returns_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.disconnect("nope").await);
    }
}
