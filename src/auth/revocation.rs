use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Ids of logged-out tokens, each kept until the token would have expired
/// on its own.
#[derive(Clone, Default)]
pub struct RevokedTokens {
    entries: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
}

impl RevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) {
        self.entries.write().await.insert(token_id, expires_at);
    }

    pub async fn is_revoked(&self, token_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&token_id)
    }

    /// Drops entries whose token has expired anyway. Returns how many went.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
