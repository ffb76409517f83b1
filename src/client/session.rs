use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, create_dir_all};
use tokio::sync::RwLock;

use super::ClientError;
use crate::models::PublicUser;

/// Token and identity snapshot, always stored and cleared together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub token: String,
    pub user: PublicUser,
}

/// The client's "current user". Optionally mirrored to a JSON file so a
/// session survives restarts of the client process.
pub struct SessionStore {
    path: Option<PathBuf>,
    state: RwLock<Option<SessionState>>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(None),
        }
    }

    /// Loads an existing session file if there is one. A file that cannot be
    /// parsed is discarded and the session starts logged out.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ClientError> {
        let path = path.into();
        let state = match read_session_file(&path).await? {
            Some(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                Ok(state) => Some(state),
                Err(err) => {
                    log::warn!("discarding unreadable session file {}: {}", path.display(), err);
                    remove_session_file(&path).await?;
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub async fn establish(&self, session: SessionState) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        if let Some(path) = &self.path {
            write_session_file(path, &serde_json::to_vec_pretty(&session)?).await?;
        }
        *state = Some(session);
        Ok(())
    }

    /// Clears token and user in one step, in memory and on disk.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        *state = None;
        if let Some(path) = &self.path {
            remove_session_file(path).await?;
        }
        Ok(())
    }

    pub async fn current(&self) -> Option<SessionState> {
        self.state.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|s| s.token.clone())
    }

    pub async fn user(&self) -> Option<PublicUser> {
        self.state.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_some()
    }
}

async fn read_session_file(path: &Path) -> Result<Option<Vec<u8>>, ClientError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_session_file(path: &Path, bytes: &[u8]) -> Result<(), ClientError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    // write-then-rename so a crash never leaves half a session behind
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_session_file(path: &Path) -> Result<(), ClientError> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}
