//! Durable lockout state.
//!
//! The lockout state machine works entirely in memory; a store only mirrors
//! each account's state so locks survive a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::security::lockout::AccountSecurityState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lockout store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("lockout store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Persistence collaborator for account security state.
#[async_trait]
pub trait SecurityStateStore: Send + Sync + 'static {
    async fn load(&self, user_id: &str) -> Result<Option<AccountSecurityState>, StoreError>;
    async fn save(&self, user_id: &str, state: &AccountSecurityState) -> Result<(), StoreError>;
}

/// Store that keeps nothing; state lives only in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl SecurityStateStore for NullStore {
    async fn load(&self, _user_id: &str) -> Result<Option<AccountSecurityState>, StoreError> {
        Ok(None)
    }

    async fn save(&self, _user_id: &str, _state: &AccountSecurityState) -> Result<(), StoreError> {
        Ok(())
    }
}

/// JSON file holding every account's state.
///
/// The whole map is rewritten on each save; lockout writes are rare
/// (failed logins and resets), so this stays cheap.
pub struct JsonFileStore {
    path: PathBuf,
    states: DashMap<String, AccountSecurityState>,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store, loading existing state if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let states = DashMap::new();

        if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            let map: HashMap<String, AccountSecurityState> = serde_json::from_slice(&content)?;
            for (k, v) in map {
                states.insert(k, v);
            }
            tracing::info!(path = %path.display(), accounts = states.len(), "Loaded lockout state");
        }

        Ok(Self {
            path,
            states,
            write_lock: Mutex::new(()),
        })
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let map: HashMap<_, _> = self
            .states
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let bytes = serde_json::to_vec_pretty(&map)?;

        // Write-then-rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SecurityStateStore for JsonFileStore {
    async fn load(&self, user_id: &str) -> Result<Option<AccountSecurityState>, StoreError> {
        Ok(self.states.get(user_id).map(|r| r.value().clone()))
    }

    async fn save(&self, user_id: &str, state: &AccountSecurityState) -> Result<(), StoreError> {
        self.states.insert(user_id.to_string(), state.clone());
        self.flush().await
    }
}
