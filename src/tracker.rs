// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository tracking.
//!
//! The __tracker__ remembers git repositories that the user cares about, so
//! they can be recloned on another machine. Each tracked repository is a
//! [`RepoRecord`] in the tracking document kept by the [`ConfigStore`].
//!
//! # Repository Names
//!
//! Records are keyed by name. Normally the name is just the name of the
//! directory the repository was added from. Repositories that live inside an
//! __enlistment__, i.e., a multi-repository checkout whose root directory
//! carries a `.gclient` marker file, are named `<enlistment>/<repository>`
//! instead. This keeps `edge/src` and `chromium/src` apart, and makes sync
//! recreate the enlistment layout underneath the base path.
//!
//! # Base Paths
//!
//! Every operating system gets its own base path in the tracking document.
//! Sync, status, and scan all work relative to the base path of the
//! operating system the tracker was opened for. A session may override the
//! base path without touching the tracking document, e.g., through the
//! `DEV_WORKSPACE` environment variable.
//!
//! # Sync
//!
//! Sync is a best effort reconciliation pass. Repositories whose target
//! directory already exists are skipped without checking what is actually
//! in there. Repositories that cannot be cloned are reported as failed, and
//! sync moves on to the next one.

pub mod clone;
pub mod git;
pub mod scan;

use crate::{
    config::{ConfigError, OsKind, RepoRecord, TrackerConfig},
    store::{ConfigStore, StoreError},
    tracker::{
        clone::{CloneError, Cloner, Git2Cloner},
        git::{GitError, PullOutcome, StaleBranch},
        scan::{find_repositories, is_repository, SCAN_DEPTH},
    },
};

use chrono::Utc;
use std::{
    fs::{canonicalize, remove_dir_all},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Marker file at the root of a multi-repository enlistment.
pub const ENLISTMENT_MARKER: &str = ".gclient";

/// Placeholder shown for records without a remote URL.
pub const NO_REMOTE: &str = "N/A";

/// Placeholder shown for records without an add time.
pub const UNKNOWN_ADDED_AT: &str = "Unknown";

/// Repository tracker.
///
/// Holds the tracking document in memory. Every mutating operation writes
/// the whole document back through the config store before returning.
#[derive(Debug)]
pub struct Tracker<C = Git2Cloner>
where
    C: Cloner,
{
    store: ConfigStore,
    config: TrackerConfig,
    os: OsKind,
    workspace: Option<PathBuf>,
    cloner: C,
}

impl<C> Tracker<C>
where
    C: Cloner,
{
    /// Open tracker for target operating system.
    ///
    /// Initializes the tracking document with built-in defaults if it does
    /// not exist yet, then loads it.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::Store`] if the tracking document cannot be
    ///   created or loaded.
    #[instrument(skip(store, cloner), level = "debug")]
    pub fn open(store: ConfigStore, os: OsKind, cloner: C) -> Result<Self> {
        if store.initialize()? {
            info!("created config at {:?}", store.path().display());
        }
        let config = store.load()?;

        Ok(Self {
            store,
            config,
            os,
            workspace: None,
            cloner,
        })
    }

    /// Override base path for this session only.
    ///
    /// The override is never written to the tracking document.
    pub fn with_workspace(mut self, workspace: Option<PathBuf>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Current in-memory tracking document.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Operating system the tracker resolves base paths for.
    pub fn os(&self) -> OsKind {
        self.os
    }

    /// Path to the tracking document.
    pub fn config_path(&self) -> &Path {
        self.store.path()
    }

    /// Resolve base path for current operating system.
    ///
    /// Session override wins over the tracking document.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::NoBasePath`] if no base path is configured.
    /// - Return [`TrackerError::Config`] if shell expansion fails.
    pub fn base_path(&self) -> Result<PathBuf> {
        if let Some(workspace) = &self.workspace {
            return Ok(workspace.clone());
        }

        self.config
            .default_base_paths
            .resolve(self.os)?
            .ok_or(TrackerError::NoBasePath { os: self.os })
    }

    /// Track repository at target path.
    ///
    /// Replaces any record with the same name, refreshing its add time.
    /// A repository without an `origin` remote is still tracked, but with an
    /// empty remote URL and a warning.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::PathNotFound`] if the path does not exist.
    /// - Return [`TrackerError::NotAGitRepository`] if the path is not a git
    ///   repository.
    /// - Return [`TrackerError::Git`] if the repository cannot be opened.
    /// - Return [`TrackerError::Store`] if the tracking document cannot be
    ///   written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<AddReport> {
        let report = self.track(path.as_ref())?;
        self.store.save(&self.config)?;
        info!("added repository {}", report.record.name);

        Ok(report)
    }

    /// Stop tracking repository by name.
    ///
    /// The repository itself is left alone on disk.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::RepositoryNotTracked`] if no record has the
    ///   given name.
    /// - Return [`TrackerError::Store`] if the tracking document cannot be
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&mut self, name: &str) -> Result<RepoRecord> {
        let record = self
            .config
            .remove_repo(name)
            .ok_or_else(|| TrackerError::RepositoryNotTracked { name: name.into() })?;
        self.store.save(&self.config)?;
        info!("removed repository {name}");

        Ok(record)
    }

    /// List tracked repositories in storage order.
    pub fn list(&self) -> Vec<ListEntry> {
        self.config.repos.iter().map(ListEntry::from).collect()
    }

    /// Clone every tracked repository that is missing on this machine.
    ///
    /// Creates the base path if needed. Never stops at a failed repository.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::NoBasePath`] if no base path is configured.
    /// - Return [`TrackerError::CreateDir`] if the base path cannot be
    ///   created.
    #[instrument(skip(self, opts), level = "debug")]
    pub fn sync(&self, opts: &SyncOptions) -> Result<SyncReport> {
        let base_path = self.base_path()?;
        mkdirp::mkdirp(&base_path).map_err(|source| TrackerError::CreateDir {
            source,
            path: base_path.clone(),
        })?;
        info!("sync repositories into {:?}", base_path.display());

        let mut report = SyncReport {
            base_path: base_path.clone(),
            entries: Vec::with_capacity(self.config.repos.len()),
        };

        for record in &self.config.repos {
            let Some(target) = record.target_path(&base_path) else {
                warn!("refuse to sync {:?} (name escapes base path)", record.name);
                report.entries.push(SyncEntry {
                    name: record.name.clone(),
                    target: None,
                    outcome: SyncOutcome::Failed(SyncFailure::UnsafeName),
                });
                continue;
            };

            let outcome = if target.exists() {
                debug!("skip {} (already exists)", record.name);
                let stale = if opts.check_stale {
                    self.inspect_stale(record, &target)
                } else {
                    None
                };
                SyncOutcome::Skipped { stale }
            } else if record.remote_url.is_empty() {
                warn!("cannot clone {} (no remote URL)", record.name);
                SyncOutcome::Failed(SyncFailure::NoRemoteConfigured)
            } else {
                match self.clone_record(record, &target) {
                    Ok(()) => SyncOutcome::Synced,
                    Err(err) => {
                        warn!("failed to clone {}: {err}", record.name);
                        SyncOutcome::Failed(SyncFailure::CloneFailed(err))
                    }
                }
            };

            report.entries.push(SyncEntry {
                name: record.name.clone(),
                target: Some(target),
                outcome,
            });
        }

        info!(
            "synced {} | skipped {} | failed {}",
            report.synced(),
            report.skipped(),
            report.failed()
        );

        Ok(report)
    }

    /// Report which tracked repositories exist on this machine.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::NoBasePath`] if no base path is configured.
    #[instrument(skip(self), level = "debug")]
    pub fn status(&self) -> Result<StatusReport> {
        let base_path = self.base_path()?;
        let entries = self
            .config
            .repos
            .iter()
            .map(|record| {
                let target = record.target_path(&base_path);
                StatusEntry {
                    name: record.name.clone(),
                    present: target.as_ref().is_some_and(|target| target.exists()),
                    target,
                }
            })
            .collect();

        Ok(StatusReport { base_path, entries })
    }

    /// Track every repository found underneath target root.
    ///
    /// Defaults to the base path of the current operating system. Searches
    /// [`SCAN_DEPTH`] levels deep. Repositories that cannot be tracked are
    /// reported, but do not stop the scan.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::NoBasePath`] if no root is given and no base
    ///   path is configured.
    /// - Return [`TrackerError::PathNotFound`] if the root does not exist.
    /// - Return [`TrackerError::Store`] if the tracking document cannot be
    ///   written.
    #[instrument(skip(self, root), level = "debug")]
    pub fn scan(&mut self, root: Option<&Path>) -> Result<ScanReport> {
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => self.base_path()?,
        };
        if !root.is_dir() {
            return Err(TrackerError::PathNotFound { path: root });
        }
        info!("scan {:?} for repositories", root.display());

        let mut report = ScanReport {
            root: root.clone(),
            ..Default::default()
        };
        for candidate in find_repositories(&root, SCAN_DEPTH) {
            match self.track(&candidate) {
                Ok(added) => {
                    // INVARIANT: Only the last repository claiming a name stays tracked.
                    if let Some(index) = report
                        .added
                        .iter()
                        .position(|prev| prev.record.name == added.record.name)
                    {
                        let shadowed = report.added.remove(index);
                        warn!(
                            "{:?} replaces {:?} as {}",
                            added.record.added_from, shadowed.record.added_from, added.record.name
                        );
                        report.warnings.push(RepoWarning::ReplacedDuringScan {
                            name: added.record.name.clone(),
                            dropped: shadowed.record.added_from,
                            kept: added.record.added_from.clone(),
                        });
                    }
                    report.added.push(added);
                }
                Err(error) => {
                    warn!("cannot track {:?}: {error}", candidate.display());
                    report.failures.push(ScanFailure {
                        path: candidate,
                        error,
                    });
                }
            }
        }

        if !report.added.is_empty() {
            self.store.save(&self.config)?;
        }
        info!("added {} repositories", report.added.len());

        Ok(report)
    }

    /// Set base path of target operating system.
    ///
    /// The path is stored as given, and is not required to exist.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::Config`] wrapping
    ///   [`ConfigError::UnsupportedOs`] if the operating system is not
    ///   recognized. Nothing is changed in that case.
    /// - Return [`TrackerError::Store`] if the tracking document cannot be
    ///   written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn set_base_path(&mut self, os: &str, path: impl Into<String>) -> Result<OsKind> {
        let os: OsKind = os.parse()?;
        let path = path.into();
        self.config.default_base_paths.set(os, path.as_str());
        self.store.save(&self.config)?;
        info!("set {os} base path to {path:?}");

        Ok(os)
    }

    /// Fast-forward the git repository that holds the tracking document.
    ///
    /// Lets a tracking document kept in a dotfiles repository pick up
    /// repositories added on other machines. The in-memory document is
    /// reloaded afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`TrackerError::Store`] if the pulled document cannot be
    ///   loaded.
    #[instrument(skip(self), level = "debug")]
    pub fn pull_config(&mut self) -> Result<PullOutcome> {
        let dir = match self.store.path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let outcome = git::pull_fast_forward(&dir);
        if outcome == PullOutcome::Updated {
            self.config = self.store.load()?;
        }

        Ok(outcome)
    }

    /// Track repository in memory without persisting.
    fn track(&mut self, path: &Path) -> Result<AddReport> {
        let path = canonicalize(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => TrackerError::PathNotFound {
                path: std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
            },
            _ => TrackerError::Io(err),
        })?;

        if !is_repository(&path) {
            return Err(TrackerError::NotAGitRepository { path });
        }

        let name = derive_name(&path).ok_or_else(|| TrackerError::NotAGitRepository {
            path: path.clone(),
        })?;

        let mut warnings = Vec::new();
        let remote_url = match git::origin_url(&path)? {
            Some(url) => url,
            None => {
                warn!("no 'origin' remote found for {name}");
                warnings.push(RepoWarning::NoRemoteConfigured { name: name.clone() });
                String::new()
            }
        };

        let record = RepoRecord {
            name,
            remote_url,
            added_from: path.to_string_lossy().into_owned(),
            added_at: Some(Utc::now()),
        };
        let replaced = self.config.upsert_repo(record.clone()).is_some();
        debug!("track {} (replaced: {replaced})", record.name);

        Ok(AddReport {
            record,
            replaced,
            warnings,
        })
    }

    fn clone_record(&self, record: &RepoRecord, target: &Path) -> Result<(), CloneError> {
        if let Some(parent) = target.parent() {
            mkdirp::mkdirp(parent).map_err(|source| CloneError::CreateParent {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        info!("clone {}", record.name);
        let result = self.cloner.clone_repo(&record.remote_url, target);

        // INVARIANT: Never leave a half-cloned target behind, or the next sync would skip it.
        if result.is_err() && target.exists() {
            if let Err(err) = remove_dir_all(target) {
                warn!("cannot clean up {:?}: {err}", target.display());
            }
        }

        result
    }

    fn inspect_stale(&self, record: &RepoRecord, target: &Path) -> Option<StaleBranch> {
        match git::inspect_branch(target, Utc::now()) {
            Ok(stale) => stale,
            Err(err) => {
                debug!("cannot inspect branch of {}: {err}", record.name);
                None
            }
        }
    }
}

/// Derive tracking name of repository at target absolute path.
///
/// Repositories directly inside an enlistment are named
/// `<enlistment>/<repository>`. Everything else is named after its
/// directory. Returns `None` for paths without a final component.
pub fn derive_name(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let leaf = path.file_name()?.to_string_lossy();

    match path.parent() {
        Some(parent) if parent.join(ENLISTMENT_MARKER).exists() => {
            let enlistment = parent.file_name()?.to_string_lossy();
            Some(format!("{enlistment}/{leaf}"))
        }
        _ => Some(leaf.into_owned()),
    }
}

/// Result of tracking a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReport {
    /// Record as written to the tracking document.
    pub record: RepoRecord,

    /// Whether a record with the same name was replaced.
    pub replaced: bool,

    /// Problems that did not stop the repository from being tracked.
    pub warnings: Vec<RepoWarning>,
}

/// Non-fatal problem found while tracking a repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoWarning {
    #[error("repository {name:?} has no 'origin' remote, it cannot be recloned")]
    NoRemoteConfigured { name: String },

    /// Two repositories found by one scan derive the same name.
    #[error("{kept:?} and {dropped:?} are both named {name:?}, only {kept:?} is tracked")]
    ReplacedDuringScan {
        name: String,
        dropped: String,
        kept: String,
    },
}

/// Tracked repository as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,

    /// Remote URL, or [`NO_REMOTE`].
    pub remote: String,

    /// RFC 3339 add time, or [`UNKNOWN_ADDED_AT`].
    pub added_at: String,
}

impl From<&RepoRecord> for ListEntry {
    fn from(record: &RepoRecord) -> Self {
        let remote = if record.remote_url.is_empty() {
            NO_REMOTE.to_string()
        } else {
            record.remote_url.clone()
        };
        let added_at = record
            .added_at
            .map(|time| time.to_rfc3339())
            .unwrap_or_else(|| UNKNOWN_ADDED_AT.to_string());

        Self {
            name: record.name.clone(),
            remote,
            added_at,
        }
    }
}

/// Knobs for [`Tracker::sync`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Look for stale branches in repositories that already exist.
    pub check_stale: bool,
}

/// Outcome of a whole sync pass.
#[derive(Debug)]
pub struct SyncReport {
    pub base_path: PathBuf,
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.count(|outcome| matches!(outcome, SyncOutcome::Synced))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, SyncOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, SyncOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| pred(&entry.outcome))
            .count()
    }
}

/// Outcome of syncing one repository.
#[derive(Debug)]
pub struct SyncEntry {
    pub name: String,

    /// Clone target, or `None` if the name escapes the base path.
    pub target: Option<PathBuf>,
    pub outcome: SyncOutcome,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Repository was cloned.
    Synced,

    /// Target already existed. Carries a notice if its checkout is stale.
    Skipped { stale: Option<StaleBranch> },

    /// Repository could not be cloned.
    Failed(SyncFailure),
}

/// Reason a repository could not be synced.
#[derive(Debug, thiserror::Error)]
pub enum SyncFailure {
    #[error("no remote URL to clone from")]
    NoRemoteConfigured,

    #[error("name is not a relative path inside the base path")]
    UnsafeName,

    #[error(transparent)]
    CloneFailed(#[from] CloneError),
}

/// Presence of tracked repositories on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub base_path: PathBuf,
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn present(&self) -> usize {
        self.entries.iter().filter(|entry| entry.present).count()
    }

    pub fn missing(&self) -> usize {
        self.entries.len() - self.present()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: String,

    /// Expected location, or `None` if the name escapes the base path.
    pub target: Option<PathBuf>,
    pub present: bool,
}

/// Outcome of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub root: PathBuf,

    /// Repositories tracked or refreshed, in discovery order.
    pub added: Vec<AddReport>,

    /// Repositories found but not tracked.
    pub failures: Vec<ScanFailure>,

    /// Repositories that were tracked, then replaced later in the same scan.
    pub warnings: Vec<RepoWarning>,
}

#[derive(Debug)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: TrackerError,
}

/// All possible error types for repository tracking.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Path to track does not exist.
    #[error("directory does not exist: {:?}", path.display())]
    PathNotFound { path: PathBuf },

    /// Path to track has no git metadata.
    #[error("not a git repository: {:?}", path.display())]
    NotAGitRepository { path: PathBuf },

    /// No record with given name.
    #[error("repository {name:?} is not tracked")]
    RepositoryNotTracked { name: String },

    /// Tracking document has no base path for operating system.
    #[error("no base path configured for {os}, use set-path to configure one")]
    NoBasePath { os: OsKind },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration value is invalid, e.g., unsupported operating system.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tracking document cannot be loaded or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Repository cannot be inspected.
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
