use crate::domain::ports::SessionStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Session {
    principal: String,
    expires_at: Instant,
}

/// Session tokens held in process memory. Expired tokens are dropped when
/// they are next looked up, and swept out whenever a new session is issued.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, token: &str, principal: &str, ttl: Duration) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token.to_string(),
            Session {
                principal: principal.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn touch(&self, token: &str, ttl: Duration) -> Result<Option<String>> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(token) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + ttl;
                Ok(Some(session.principal.clone()))
            }
            Some(_) => {
                sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(token).is_some())
    }

    async fn remove_principal(&self, principal: &str) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.principal != principal);
        Ok(before - sessions.len())
    }
}
