//! Persisted settings store
//!
//! A small JSON-backed string key/value map. The client uses it to remember
//! the last endpoint between runs. Writes go through a temp file and rename
//! so a crash mid-save cannot corrupt the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Result, TapvoltError};

/// File-backed string key/value settings.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Loads settings from `path`, starting empty if the file is absent.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| TapvoltError::settings(format!("corrupt settings file: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(TapvoltError::FileRead {
                    path,
                    source: e,
                })
            }
        };
        Ok(Self { path, values })
    }

    /// Returns the stored value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Stores `value` under `key` in memory; call [`Settings::save`] to
    /// persist.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Removes `key`, returning the previous value if any.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Persists the store to disk atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TapvoltError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let text = serde_json::to_string_pretty(&self.values)
            .map_err(|e| TapvoltError::settings(format!("serialize settings: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| TapvoltError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| TapvoltError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Path this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
