// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cloning of tracked repositories.
//!
//! Sync goes through the [`Cloner`] trait rather than calling libgit2
//! directly, so the reconciliation logic can be exercised without a network.
//! [`Git2Cloner`] is the real thing.
//!
//! # Timeouts
//!
//! Libgit2 has no notion of a deadline for a clone. Instead, every progress
//! callback checks how long the clone has been running, and cancels the
//! transfer once the deadline has passed. A remote that stops sending data
//! entirely will not trigger a callback, so the deadline is best effort.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    cell::Cell,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{info, instrument};

/// Layer of indirection for cloning repositories.
pub trait Cloner {
    /// Clone repository at target URL into target path.
    ///
    /// The parent directory of the target path already exists, the target
    /// path itself does not.
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()>;
}

/// Repository cloning through libgit2.
///
/// Credentials are resolved through [`GitAuthenticator`], which tries
/// ssh-agent, default ssh keys, and git credential helpers before prompting.
#[derive(Debug, Clone, Default)]
pub struct Git2Cloner {
    timeout: Option<Duration>,
    show_progress: bool,
}

impl Git2Cloner {
    /// Construct new libgit2 cloner without deadline or progress bar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel clones that run longer than target duration.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Display progress bar while cloning.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

impl Cloner for Git2Cloner {
    /// Clone repository with progress bar and credential prompting.
    ///
    /// If any credentials are required for the clone to continue, then the
    /// user will be prompted for them. The progress bar will be blocked for
    /// user input.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::TimedOut`] if the deadline passed.
    /// - Return [`CloneError::Git2`] if libgit2 operations fail.
    /// - Return [`CloneError::IndicatifStyleTemplate`] if the progress bar
    ///   cannot be styled.
    #[instrument(skip(self, path), level = "debug")]
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        info!("clone {url} into {:?}", path.display());
        let bar = if self.show_progress {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let started = Instant::now();
        let timed_out = Cell::new(false);
        let expired = || match self.timeout {
            Some(timeout) if started.elapsed() > timeout => {
                timed_out.set(true);
                true
            }
            _ => false,
        };

        let mut throttle = Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if expired() {
                return false;
            }

            let stats = progress.to_owned();
            if throttle.elapsed() > Duration::from_millis(10) {
                throttle = Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });
        rc.sideband_progress(|_| !expired());

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = RepoBuilder::new().fetch_options(fo).clone(url, path);
        prompter.bar.finish_and_clear();

        match result {
            Ok(_) => Ok(()),
            Err(_) if timed_out.get() => Err(CloneError::TimedOut {
                url: url.to_string(),
                timeout: self.timeout.unwrap_or_default(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// All possible error types for cloning.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Clone ran past its deadline and was cancelled.
    #[error("clone of {url} cancelled after {timeout:?}")]
    TimedOut { url: String, timeout: Duration },

    /// Parent directory of clone target cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = CloneError> = std::result::Result<T, E>;
