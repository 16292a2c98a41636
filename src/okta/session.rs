use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::store::open_path_secure;

/// One cached IdP session, owned by the username that established it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSession {
    pub username: String,
    pub session_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// On-disk store of cached IdP sessions. Unreadable or expired entries are
/// silently dropped; a login can always be redone.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All cached sessions that have not yet expired
    pub fn load(&self) -> Vec<CachedSession> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };

        let sessions: Vec<CachedSession> = match serde_json::from_str(&contents) {
            Ok(sessions) => sessions,
            Err(e) => {
                debug!("Discarding unreadable session cache: {}", e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        sessions
            .into_iter()
            .filter(|s| s.expires_at > now)
            .collect()
    }

    /// The cached session for a username, if one is still live
    pub fn find(&self, username: &str) -> Option<CachedSession> {
        self.load().into_iter().find(|s| s.username == username)
    }

    /// Insert or replace the session for a username, dropping expired
    /// entries along the way
    pub fn save(&self, session: CachedSession) -> Result<()> {
        let mut sessions = self.load();
        sessions.retain(|s| s.username != session.username);
        sessions.push(session);

        let mut file = open_path_secure(&self.path)?;
        let contents = serde_json::to_string_pretty(&sessions)
            .map_err(|e| anyhow::anyhow!("failed to serialize session cache: {e}"))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Drop the cached session for a username (e.g. after the IdP rejected it)
    pub fn remove(&self, username: &str) -> Result<()> {
        let mut sessions = self.load();
        sessions.retain(|s| s.username != username);

        let mut file = open_path_secure(&self.path)?;
        let contents = serde_json::to_string_pretty(&sessions)
            .map_err(|e| anyhow::anyhow!("failed to serialize session cache: {e}"))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}
