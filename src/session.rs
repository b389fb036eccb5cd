use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::auth;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const SIDEBAR_KEY: &str = "sidebarCollapsed";

/// Plain string key-value storage. Last write wins.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// JSON object on disk, rewritten in full on every change.
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not a session file", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Session state handed to every command instead of living in globals.
///
/// Built once from storage with [`SessionContext::load`], mutated only
/// through its setters, and cleared with [`SessionContext::logout`].
pub struct SessionContext<S: KeyValueStore> {
    store: S,
    token: Option<String>,
    user: Option<serde_json::Value>,
    sidebar_collapsed: bool,
}

impl<S: KeyValueStore> SessionContext<S> {
    pub fn load(mut store: S, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut token = store.get(TOKEN_KEY);
        let mut user = store
            .get(USER_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok());

        if token.as_deref().is_some_and(|t| auth::is_expired(t, now)) {
            info!("stored token has expired; clearing session");
            store.remove(TOKEN_KEY)?;
            store.remove(USER_KEY)?;
            token = None;
            user = None;
        }

        let sidebar_collapsed = store
            .get(SIDEBAR_KEY)
            .map(|raw| raw == "true")
            .unwrap_or(false);

        Ok(Self {
            store,
            token,
            user,
            sidebar_collapsed,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&serde_json::Value> {
        self.user.as_ref()
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.sidebar_collapsed
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.token
            .as_deref()
            .is_some_and(|token| !auth::is_expired(token, now))
    }

    pub fn sign_in(&mut self, token: &str, user: serde_json::Value) -> anyhow::Result<()> {
        self.store.set(TOKEN_KEY, token)?;
        self.store.set(USER_KEY, &serde_json::to_string(&user)?)?;
        self.token = Some(token.to_string());
        self.user = Some(user);
        Ok(())
    }

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) -> anyhow::Result<()> {
        self.store
            .set(SIDEBAR_KEY, if collapsed { "true" } else { "false" })?;
        self.sidebar_collapsed = collapsed;
        Ok(())
    }

    pub fn logout(&mut self) -> anyhow::Result<()> {
        debug!("tearing down session");
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        self.token = None;
        self.user = None;
        Ok(())
    }

    /// A 401 ends the session the same way an expired token does.
    pub fn forced_logout(&mut self, err: ApiError) -> anyhow::Error {
        if matches!(err, ApiError::Unauthorized) {
            if let Err(clear) = self.logout() {
                warn!(error = %clear, "failed to clear session after 401");
            }
        }
        err.into()
    }
}
