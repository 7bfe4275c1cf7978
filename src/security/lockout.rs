//! Account lockout state machine.
//!
//! # States
//! - Active: logins are evaluated normally
//! - Locked: every login is rejected until `locked_until`
//!
//! # State Transitions
//! ```text
//! Active → Locked: failed_attempts reaches threshold (locked_until = now + duration)
//! Locked → Active: first check at or after locked_until (lazy, counter reset)
//! Active → Active: successful login resets failed_attempts
//! ```
//!
//! # Design Decisions
//! - No timers: expiry is repaired on the next read
//! - One async mutex per account; concurrent logins for an account are
//!   serialized, other accounts never wait on it
//! - Deadlines are wall-clock millis so a persisted lock survives restarts

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::observability::metrics;
use crate::security::store::{SecurityStateStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Locked,
}

/// Security state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSecurityState {
    pub failed_attempts: u32,
    /// Unix millis; set only while locked.
    pub locked_until: Option<u64>,
    pub status: AccountStatus,
}

impl Default for AccountSecurityState {
    fn default() -> Self {
        Self {
            failed_attempts: 0,
            locked_until: None,
            status: AccountStatus::Active,
        }
    }
}

impl AccountSecurityState {
    /// Apply the lazy unlock. Returns true if the state changed.
    fn repair(&mut self, now: u64) -> bool {
        match (self.status, self.locked_until) {
            (AccountStatus::Locked, Some(until)) if now >= until => {
                *self = Self::default();
                true
            }
            _ => false,
        }
    }

    /// Remaining lock time, if locked at `now`.
    fn locked_for(&self, now: u64) -> Option<Duration> {
        match (self.status, self.locked_until) {
            (AccountStatus::Locked, Some(until)) if now < until => {
                Some(Duration::from_millis(until - now))
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockoutError {
    #[error("account is locked")]
    Locked { retry_after: Duration },
    #[error("invalid credentials")]
    InvalidCredentials { remaining_attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

type AccountCell = Arc<Mutex<Option<AccountSecurityState>>>;

/// Failed-login tracking for every account.
pub struct LockoutStateMachine {
    /// `None` inside the cell means "not yet loaded from the store".
    accounts: DashMap<String, AccountCell>,
    config: ArcSwap<LockoutConfig>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SecurityStateStore>,
}

impl LockoutStateMachine {
    pub fn new(
        config: LockoutConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SecurityStateStore>,
    ) -> Self {
        Self {
            accounts: DashMap::new(),
            config: ArcSwap::from_pointee(config),
            clock,
            store,
        }
    }

    fn cell(&self, user_id: &str) -> AccountCell {
        if let Some(cell) = self.accounts.get(user_id) {
            return cell.value().clone();
        }
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone()
    }

    /// Lock the account and make sure its state is loaded.
    async fn lock_account<'a>(
        &self,
        user_id: &str,
        cell: &'a AccountCell,
    ) -> Result<MutexGuard<'a, Option<AccountSecurityState>>, StoreError> {
        let mut guard = cell.lock().await;
        if guard.is_none() {
            let loaded = self.store.load(user_id).await?;
            *guard = Some(loaded.unwrap_or_default());
        }
        Ok(guard)
    }

    /// Create the account's state (ACTIVE). Idempotent.
    pub async fn register(&self, user_id: &str) -> Result<(), LockoutError> {
        let cell = self.cell(user_id);
        let mut guard = cell.lock().await;
        if guard.is_none() {
            let state = match self.store.load(user_id).await? {
                Some(existing) => existing,
                None => {
                    let fresh = AccountSecurityState::default();
                    self.store.save(user_id, &fresh).await?;
                    fresh
                }
            };
            *guard = Some(state);
        }
        Ok(())
    }

    /// Gate a request: fails with `Locked` while the account is locked.
    pub async fn check(&self, user_id: &str) -> Result<(), LockoutError> {
        let cell = self.cell(user_id);
        let mut guard = self.lock_account(user_id, &cell).await?;
        let state = guard.get_or_insert_with(AccountSecurityState::default);
        let now = self.clock.now_millis();

        if state.repair(now) {
            tracing::info!(user_id = %user_id, "Account lock expired");
            metrics::record_lockout_event("unlocked");
            self.store.save(user_id, state).await?;
        }

        match state.locked_for(now) {
            Some(retry_after) => Err(LockoutError::Locked { retry_after }),
            None => Ok(()),
        }
    }

    /// Evaluate a login attempt.
    ///
    /// `verify` runs only when the account is not locked, under the account's
    /// lock, so concurrent attempts cannot both slip past the threshold.
    pub async fn authenticate<F>(&self, user_id: &str, verify: F) -> Result<(), LockoutError>
    where
        F: FnOnce() -> bool,
    {
        let config = self.config.load_full();
        let cell = self.cell(user_id);
        let mut guard = self.lock_account(user_id, &cell).await?;
        let state = guard.get_or_insert_with(AccountSecurityState::default);
        let now = self.clock.now_millis();

        let mut dirty = state.repair(now);
        if dirty {
            metrics::record_lockout_event("unlocked");
        }

        if let Some(retry_after) = state.locked_for(now) {
            metrics::record_lockout_event("rejected");
            return Err(LockoutError::Locked { retry_after });
        }

        let result = if verify() {
            if state.failed_attempts != 0 {
                state.failed_attempts = 0;
                dirty = true;
            }
            Ok(())
        } else {
            state.failed_attempts += 1;
            dirty = true;
            if state.failed_attempts >= config.threshold {
                let duration = config.duration();
                state.status = AccountStatus::Locked;
                state.locked_until = Some(now + duration.as_millis() as u64);
                tracing::warn!(
                    user_id = %user_id,
                    failed_attempts = state.failed_attempts,
                    locked_secs = duration.as_secs(),
                    "Account locked after repeated failed logins"
                );
                metrics::record_lockout_event("locked");
                Err(LockoutError::Locked {
                    retry_after: duration,
                })
            } else {
                Err(LockoutError::InvalidCredentials {
                    remaining_attempts: config.threshold - state.failed_attempts,
                })
            }
        };

        if dirty {
            self.store.save(user_id, state).await?;
        }
        result
    }

    /// Administrative unlock: force ACTIVE and clear the counter.
    pub async fn unlock(&self, user_id: &str) -> Result<(), LockoutError> {
        let cell = self.cell(user_id);
        let mut guard = self.lock_account(user_id, &cell).await?;
        let fresh = AccountSecurityState::default();
        self.store.save(user_id, &fresh).await?;
        *guard = Some(fresh);
        tracing::info!(user_id = %user_id, "Account unlocked by administrator");
        metrics::record_lockout_event("admin_unlock");
        Ok(())
    }

    /// Current state as a check would see it, without persisting repairs.
    pub async fn snapshot(&self, user_id: &str) -> Result<AccountSecurityState, LockoutError> {
        let cell = self.cell(user_id);
        let guard = self.lock_account(user_id, &cell).await?;
        let mut state = (*guard).clone().unwrap_or_default();
        state.repair(self.clock.now_millis());
        Ok(state)
    }

    pub fn reconfigure(&self, config: LockoutConfig) {
        self.config.store(Arc::new(config));
    }

    /// Number of accounts held in memory.
    pub fn tracked_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Drop in-memory accounts whose state is plain ACTIVE with no failures
    /// (after the lazy unlock) or was never loaded. Returns how many went.
    ///
    /// Dropped accounts reload from the store on next touch, so this never
    /// changes a decision. Cells held by an in-flight call are kept.
    pub fn sweep_idle(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.accounts.len();

        self.accounts.retain(|_, cell| match Arc::get_mut(cell) {
            Some(mutex) => match mutex.get_mut() {
                Some(state) => {
                    let mut view = state.clone();
                    view.repair(now);
                    view != AccountSecurityState::default()
                }
                None => false,
            },
            None => true,
        });
        before.saturating_sub(self.accounts.len())
    }
}
