//! Persistent device identity
//!
//! The host correlates clients by a stable opaque identifier created on
//! first use and never rotated afterwards.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use tapvolt_utils::{paths, Result, TapvoltError};

/// Resolves the stable device identifier, creating it on first use.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_or_create_device_id(&self) -> Result<String>;
}

/// Identity stored as a UUID in a file under the data directory.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    /// Store under the default location, `$XDG_DATA_HOME/tapvolt/device-id`.
    pub fn new() -> Self {
        Self {
            path: paths::device_id_file(),
        }
    }

    /// Store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for FileIdentity {
    async fn resolve_or_create_device_id(&self) -> Result<String> {
        let path = self.path.clone();
        // the identity file is tiny; blocking IO runs off the worker pool
        tokio::task::spawn_blocking(move || read_or_create(&path))
            .await
            .map_err(|e| TapvoltError::identity(format!("identity task failed: {e}")))?
    }
}

fn read_or_create(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let trimmed = text.trim();
            if Uuid::parse_str(trimmed).is_ok() {
                return Ok(trimmed.to_string());
            }
            tracing::warn!(path = %path.display(), "device identity file is not a UUID, regenerating");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(TapvoltError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TapvoltError::FileWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, &id).map_err(|e| TapvoltError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(id)
}
