//! Durable token table (§6.5 "Tokens per account"): the access token,
//! issue/expiry timestamps, and freshness status that must survive a
//! process restart so the Token Refresher's preemptive scan has
//! something to scan on startup instead of treating every account as
//! `invalid`.
//!
//! Mirrors `tickgate_execution::store`'s split: a [`TokenStore`] trait
//! seam, an in-memory implementation for tests, and a minimal
//! filesystem-backed implementation (one file per account, mode `0600`
//! per §6.5's "tokens are as sensitive as the credentials they refresh")
//! demonstrating the durable shape without a real KMS/database
//! dependency (out of scope per §1 Non-goals).

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use tickgate_markets::account::Credentials;
use tickgate_markets::{AccountId, TokenState, TokenStatus};

/// Persists and retrieves [`TokenState`] keyed by [`AccountId`].
pub trait TokenStore: Send + Sync {
    fn get(&self, account_id: &AccountId) -> Option<TokenState>;
    fn put(&self, account_id: &AccountId, state: &TokenState);
}

/// In-memory token table. Every account starts as `invalid` on process
/// restart under this implementation — acceptable for tests, not for a
/// real deployment that wants to survive a restart without forcing every
/// account through a cold token refresh.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<AccountId, TokenState>>,
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self, account_id: &AccountId) -> Option<TokenState> {
        self.tokens.lock().get(account_id).cloned()
    }

    fn put(&self, account_id: &AccountId, state: &TokenState) {
        self.tokens.lock().insert(account_id.clone(), state.clone());
    }
}

/// On-disk shape for one account's token file. `TokenState` itself
/// round-trips through `serde` already (its `Credentials` field is
/// `Serialize`/`Deserialize`, not `Debug`-redacted at that layer) so this
/// is a thin wrapper rather than a hand-rolled format.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    issued_at: chrono::DateTime<chrono::Utc>,
    expires_at: chrono::DateTime<chrono::Utc>,
    status: TokenStatus,
}

impl From<&TokenState> for TokenFile {
    fn from(value: &TokenState) -> Self {
        Self {
            access_token: value.access_token.expose().to_string(),
            issued_at: value.issued_at,
            expires_at: value.expires_at,
            status: value.status,
        }
    }
}

impl From<TokenFile> for TokenState {
    fn from(value: TokenFile) -> Self {
        Self {
            access_token: Credentials::new(value.access_token),
            issued_at: value.issued_at,
            expires_at: value.expires_at,
            status: value.status,
        }
    }
}

/// One JSON file per account under `dir`, written at mode `0600`. A
/// write replaces the file's contents outright; there is no append log
/// here the way `JsonlTaskStore` keeps one (a token table has no need for
/// order-task-style history, only "what's current").
#[derive(Debug)]
pub struct FsTokenStore {
    dir: PathBuf,
}

impl FsTokenStore {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, account_id: &AccountId) -> PathBuf {
        self.dir.join(format!("{account_id}.json"))
    }

    fn write_locked(&self, account_id: &AccountId, state: &TokenState) -> std::io::Result<()> {
        let path = self.path_for(account_id);
        let contents = serde_json::to_vec_pretty(&TokenFile::from(state)).map_err(std::io::Error::other)?;
        std::fs::write(&path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl TokenStore for FsTokenStore {
    fn get(&self, account_id: &AccountId) -> Option<TokenState> {
        let contents = std::fs::read(self.path_for(account_id)).ok()?;
        let file: TokenFile = serde_json::from_slice(&contents).ok()?;
        Some(file.into())
    }

    fn put(&self, account_id: &AccountId, state: &TokenState) {
        if let Err(err) = self.write_locked(account_id, state) {
            tracing::error!(error = %err, account_id = %account_id, "failed to persist token state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_state() -> TokenState {
        TokenState {
            access_token: Credentials::new("abc123"),
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(6),
            status: TokenStatus::Fresh,
        }
    }

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemoryTokenStore::default();
        store.put(&"primary".to_string(), &sample_state());
        let loaded = store.get(&"primary".to_string()).unwrap();
        assert_eq!(loaded.status, TokenStatus::Fresh);
    }

    #[test]
    fn fs_store_persists_with_owner_only_permissions() {
        let dir = std::env::temp_dir().join(format!("tickgate-tokens-{}", std::process::id()));
        let store = FsTokenStore::open(&dir).unwrap();
        store.put(&"primary".to_string(), &sample_state());

        let loaded = store.get(&"primary".to_string()).unwrap();
        assert_eq!(loaded.access_token.expose(), "abc123");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.join("primary.json")).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_account_returns_none() {
        let dir = std::env::temp_dir().join(format!("tickgate-tokens-empty-{}", std::process::id()));
        let store = FsTokenStore::open(&dir).unwrap();
        assert!(store.get(&"nobody".to_string()).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
