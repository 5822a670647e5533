//! Profile and session persistence

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::Profile;
use crate::stats::SessionStats;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile {0} not found")]
    ProfileNotFound(u64),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence boundary for profiles and finalized session records.
///
/// The connection manager only appends session records and stamps
/// profiles; listing and editing belong to the embedding application.
#[async_trait]
pub trait TunnelStore: Send + Sync {
    /// Insert or replace a profile (matched by id)
    async fn put_profile(&self, profile: Profile) -> Result<(), StoreError>;

    async fn get_profile(&self, id: u64) -> Result<Profile, StoreError>;

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Append one finalized session record
    async fn record_session(&self, stats: SessionStats) -> Result<(), StoreError>;
}

/// In-memory store used by the bundled client and tests
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<Vec<Profile>>,
    sessions: RwLock<Vec<SessionStats>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded sessions, in insertion order
    pub async fn sessions(&self) -> Vec<SessionStats> {
        self.sessions.read().await.clone()
    }
}

#[async_trait]
impl TunnelStore for MemoryStore {
    async fn put_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        Ok(())
    }

    async fn get_profile(&self, id: u64) -> Result<Profile, StoreError> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::ProfileNotFound(id))
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.profiles.read().await.clone())
    }

    async fn record_session(&self, stats: SessionStats) -> Result<(), StoreError> {
        self.sessions.write().await.push(stats);
        Ok(())
    }
}
