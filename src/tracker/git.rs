// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository inspection and git plumbing.
//!
//! Read-only questions about a repository, e.g., its origin URL or how old
//! its current branch is, are answered through libgit2. Anything that mutates
//! a working tree, e.g., switching branches or pulling, is delegated to the
//! git binary so that hooks, credential helpers, and user configuration
//! behave exactly as they would from a shell.

use chrono::{DateTime, Utc};
use git2::{ErrorCode, Repository};
use std::{
    ffi::OsStr,
    path::Path,
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Checked out branches whose last commit is at least this old are stale.
pub const STALE_AFTER_DAYS: i64 = 14;

/// Name of the remote that tracked repositories are cloned from.
pub const ORIGIN: &str = "origin";

/// Query URL of the `origin` remote of repository at target path.
///
/// Returns `None` if the repository has no `origin` remote, or if its URL is
/// not valid UTF-8.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if the repository cannot be opened.
#[instrument(skip(path), level = "debug")]
pub fn origin_url(path: impl AsRef<Path>) -> Result<Option<String>> {
    let repository = Repository::open(path.as_ref())?;
    let remote = match repository.find_remote(ORIGIN) {
        Ok(remote) => remote,
        Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
        Err(err) if err.code() == ErrorCode::InvalidSpec => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    Ok(remote.url().map(ToString::to_string))
}

/// Checked out branch that fell behind the remote's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleBranch {
    /// Currently checked out branch.
    pub current: String,

    /// Default branch of the `origin` remote.
    pub default: String,

    /// Age of the last commit on the current branch in whole days.
    pub age_days: i64,
}

impl StaleBranch {
    /// Decide whether a checkout is stale.
    ///
    /// A checkout is stale if its last commit is at least
    /// [`STALE_AFTER_DAYS`] old, and it is not on the default branch.
    pub fn evaluate(
        current: impl Into<String>,
        default: Option<impl Into<String>>,
        age_days: i64,
    ) -> Option<Self> {
        if age_days < STALE_AFTER_DAYS {
            return None;
        }

        let current = current.into();
        let default = default?.into();
        if current == default {
            return None;
        }

        Some(Self {
            current,
            default,
            age_days,
        })
    }
}

/// Inspect checked out branch of repository at target path.
///
/// Repositories with a detached or unborn HEAD are never considered stale.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if the repository cannot be opened, or its
///   HEAD commit cannot be read.
#[instrument(skip(path, now), level = "debug")]
pub fn inspect_branch(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Option<StaleBranch>> {
    let repository = Repository::open(path.as_ref())?;
    let head = match repository.head() {
        Ok(head) => head,
        Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if !head.is_branch() {
        debug!("{:?} has detached HEAD", path.as_ref().display());
        return Ok(None);
    }

    let Some(current) = head.shorthand() else {
        return Ok(None);
    };
    let commit = head.peel_to_commit()?;
    let age_days = ((now.timestamp() - commit.time().seconds()) / 86_400).max(0);

    Ok(StaleBranch::evaluate(
        current,
        default_branch(&repository),
        age_days,
    ))
}

/// Determine default branch of the `origin` remote.
///
/// Prefers whatever `refs/remotes/origin/HEAD` points at. Falls back to
/// `main`, then `master`, if a remote-tracking ref for them exists.
pub fn default_branch(repository: &Repository) -> Option<String> {
    let prefix = format!("refs/remotes/{ORIGIN}/");
    if let Ok(reference) = repository.find_reference(&format!("{prefix}HEAD")) {
        if let Some(branch) = reference
            .symbolic_target()
            .and_then(|target| target.strip_prefix(prefix.as_str()))
        {
            return Some(branch.to_string());
        }
    }

    ["main", "master"]
        .into_iter()
        .find(|branch| {
            repository
                .find_reference(&format!("{prefix}{branch}"))
                .is_ok()
        })
        .map(ToString::to_string)
}

/// Force checkout at target path onto the remote's default branch.
///
/// Fetches `origin`, force checks out the default branch, and hard resets it
/// to its remote-tracking branch. Local changes are discarded.
///
/// # Errors
///
/// - Return [`GitError::Syscall`] if any git invocation fails.
#[instrument(skip(path, default), level = "debug")]
pub fn switch_to_default_branch(path: impl AsRef<Path>, default: impl AsRef<str>) -> Result<()> {
    let path = path.as_ref();
    let default = default.as_ref();
    info!("switch {:?} to {default}", path.display());

    gitcall_non_interactive(path, ["fetch", ORIGIN])?;
    gitcall_non_interactive(path, ["checkout", "-f", default])?;
    let upstream = format!("{ORIGIN}/{default}");
    gitcall_non_interactive(path, ["reset", "--hard", upstream.as_str()])?;

    Ok(())
}

/// Result of fast-forwarding a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Fast-forward succeeded, or there was nothing to pull.
    Updated,

    /// Local branch has commits the remote does not.
    Ahead,

    /// Working tree has uncommitted changes.
    LocalChanges,

    /// Pull failed for some other reason.
    Failed(String),
}

/// Fast-forward repository at target path from its upstream.
///
/// Never fails outright. If the fast-forward does not go through, the
/// repository is fetched and its status inspected to explain why.
#[instrument(skip(path), level = "debug")]
pub fn pull_fast_forward(path: impl AsRef<Path>) -> PullOutcome {
    let path = path.as_ref();
    let error = match gitcall_non_interactive(path, ["pull", "--ff-only"]) {
        Ok(_) => return PullOutcome::Updated,
        Err(err) => err,
    };
    debug!("fast-forward of {:?} failed: {error}", path.display());

    if let Err(err) = gitcall_non_interactive(path, ["fetch"]) {
        warn!("fetch of {:?} failed: {err}", path.display());
    }

    match gitcall_non_interactive(path, ["status", "--porcelain", "-b"]) {
        Ok(status) => classify_status(&status).unwrap_or(PullOutcome::Failed(error.to_string())),
        Err(err) => PullOutcome::Failed(err.to_string()),
    }
}

/// Explain a failed pull from porcelain status output.
fn classify_status(status: &str) -> Option<PullOutcome> {
    let mut lines = status.lines();
    let branch = lines.next().unwrap_or_default();
    if branch.starts_with("## ") && branch.contains("ahead") {
        return Some(PullOutcome::Ahead);
    }

    if lines.any(|line| !line.trim().is_empty()) {
        return Some(PullOutcome::LocalChanges);
    }

    None
}

/// Run git binary against repository at target path, capturing its output.
///
/// # Errors
///
/// - Return [`GitError::Syscall`] if git cannot be spawned or exits with a
///   failure status.
pub fn gitcall_non_interactive(
    path: impl AsRef<Path>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let mut bin_args = vec![
        OsStr::new("-C").to_os_string(),
        path.as_ref().as_os_str().to_os_string(),
    ];
    bin_args.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
    syscall_non_interactive("git", bin_args)
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        let message = stderr.trim_end();
        return Err(GitError::Syscall(std::io::Error::other(format!(
            "command {:?} failed: {message}",
            cmd.as_ref()
        ))));
    }

    // INVARIANT: Chomp trailing newlines, but keep leading whitespace of porcelain output.
    Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
}

/// Git interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary cannot be run, or reports failure.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
