// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracking document storage.
//!
//! Devrepo keeps everything it knows in one place called the __config
//! store__: a single JSON file holding base paths and repository records.
//! The whole file is read into memory, mutated there, and written back in
//! full on every change.
//!
//! # Atomic Writes
//!
//! Writes never touch the tracking document directly. The new contents are
//! written to a temporary file in the same directory, flushed to disk, and
//! then renamed over the old file. A reader will therefore see either the old
//! document or the new one, never a truncated mix of both.
//!
//! # Concurrency
//!
//! There is no locking. If two devrepo processes mutate the store at the same
//! time, the last one to rename its temporary file wins.

use crate::config::{ConfigError, TrackerConfig};

use std::{
    fs::read_to_string,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Persistent storage for the tracking document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Construct new config store backed by file at target path.
    ///
    /// Does not touch the file system.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Path to the tracking document.
    pub fn path(&self) -> &Path {
        self.config_path.as_path()
    }

    /// Load tracking document into memory.
    ///
    /// A missing tracking document is not an error. A fresh default document
    /// is returned instead, but nothing is written. Use
    /// [`ConfigStore::initialize`] to create the file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ConfigUnreadable`] if the tracking document
    ///   exists but cannot be read or parsed.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<TrackerConfig> {
        let data = match read_to_string(&self.config_path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no config at {:?}, using defaults", self.config_path.display());
                return Ok(TrackerConfig::default());
            }
            Err(err) => return Err(self.unreadable(err)),
        };

        data.parse::<TrackerConfig>()
            .map_err(|err: ConfigError| self.unreadable(io::Error::new(ErrorKind::InvalidData, err)))
    }

    /// Create tracking document with built-in defaults if it does not exist.
    ///
    /// Returns `true` if the file was created, and `false` if it was already
    /// there.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::WriteConfig`] if the document cannot be
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn initialize(&self) -> Result<bool> {
        let exists = self
            .config_path
            .try_exists()
            .map_err(|err| self.unreadable(err))?;
        if exists {
            return Ok(false);
        }

        debug!("initialize config at {:?}", self.config_path.display());
        self.save(&TrackerConfig::default())?;

        Ok(true)
    }

    /// Write tracking document, replacing any previous contents.
    ///
    /// Creates the parent directory of the tracking document if needed.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::WriteConfig`] if the temporary file cannot be
    ///   written, or cannot be renamed over the tracking document.
    #[instrument(skip(self, config), level = "debug")]
    pub fn save(&self, config: &TrackerConfig) -> Result<()> {
        let parent = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        mkdirp::mkdirp(parent).map_err(|err| self.write_failed(err))?;

        // INVARIANT: Temporary file must share a file system with the target for rename.
        let mut file = NamedTempFile::new_in(parent).map_err(|err| self.write_failed(err))?;
        file.write_all(config.to_string().as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| self.write_failed(err))?;
        file.persist(&self.config_path)
            .map_err(|err| self.write_failed(err.error))?;

        debug!("saved {} repositories", config.repos.len());

        Ok(())
    }

    fn unreadable(&self, source: io::Error) -> StoreError {
        StoreError::ConfigUnreadable {
            source,
            config_path: self.config_path.clone(),
        }
    }

    fn write_failed(&self, source: io::Error) -> StoreError {
        StoreError::WriteConfig {
            source,
            config_path: self.config_path.clone(),
        }
    }
}

/// All possible error types for config store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Tracking document exists but cannot be read or parsed.
    #[error("config at {:?} is unreadable", config_path.display())]
    ConfigUnreadable {
        #[source]
        source: io::Error,
        config_path: PathBuf,
    },

    /// Tracking document cannot be written.
    #[error("failed to write config at {:?}", config_path.display())]
    WriteConfig {
        #[source]
        source: io::Error,
        config_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasePaths, RepoRecord};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{read_dir, write};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("repoconfig").join("repos.json"))
    }

    #[test]
    fn load_missing_config_returns_defaults_without_writing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = store_in(&dir);

        let result = store.load()?;
        assert_eq!(result, TrackerConfig::default());
        assert!(!store.path().exists());

        Ok(())
    }

    #[test]
    fn initialize_writes_defaults_once() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = store_in(&dir);

        assert!(store.initialize()?);
        let result = store.load()?;
        assert_eq!(result.default_base_paths, BasePaths::builtin());
        assert!(result.repos.is_empty());

        let mut config = result;
        config.default_base_paths.linux = Some("/srv/code".into());
        store.save(&config)?;

        // No-op on second call, existing content is kept.
        assert!(!store.initialize()?);
        assert_eq!(store.load()?, config);

        Ok(())
    }

    #[test]
    fn load_garbage_is_unreadable() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = store_in(&dir);
        mkdirp::mkdirp(dir.path().join("repoconfig"))?;
        write(store.path(), "{ this is not json")?;

        let result = store.load();
        assert!(matches!(result, Err(StoreError::ConfigUnreadable { .. })));

        Ok(())
    }

    #[test]
    fn save_replaces_contents_without_leftovers() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = store_in(&dir);
        store.initialize()?;

        let mut config = store.load()?;
        config.repos.push(RepoRecord {
            name: "foo".into(),
            remote_url: "https://blah.org/foo.git".into(),
            added_from: "/workspace/foo".into(),
            added_at: None,
        });
        store.save(&config)?;

        assert_eq!(store.load()?, config);
        let entries = read_dir(dir.path().join("repoconfig"))?.count();
        assert_eq!(entries, 1);

        Ok(())
    }

    #[test]
    fn save_of_load_is_byte_identical() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let store = store_in(&dir);
        mkdirp::mkdirp(dir.path().join("repoconfig"))?;
        let contents = indoc! {r#"
            {
              "version": 1,
              "defaultBasePaths": {
                "linux": "/workspace",
                "windows": "C:\\dev"
              },
              "repos": [
                {
                  "name": "edge/src",
                  "remoteUrl": "",
                  "addedFrom": "/workspace/edge/src",
                  "addedAt": "2025-03-04T05:06:07Z"
                }
              ]
            }
        "#};
        write(store.path(), contents)?;

        store.save(&store.load()?)?;
        let result = read_to_string(store.path())?;
        assert_eq!(result, contents);

        Ok(())
    }
}
