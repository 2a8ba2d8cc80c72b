// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use devrepo::{
    config::OsKind,
    path::default_config_path,
    store::ConfigStore,
    tracker::{
        clone::Git2Cloner,
        git::{self, PullOutcome, StaleBranch},
        SyncOptions, SyncOutcome, Tracker,
    },
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::{
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "devrepo [options] <devrepo-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to tracking document.
    #[arg(long, global = true, env = "DEVREPO_CONFIG", value_name = "file")]
    pub config: Option<PathBuf>,

    /// Use this directory as the base path for this run only.
    #[arg(long, global = true, env = "DEV_WORKSPACE", value_name = "dir")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let session = Session {
            store: ConfigStore::new(config_path),
            workspace: self.workspace,
        };

        match self.command {
            Command::Init => run_init(session),
            Command::Add(opts) => run_add(session, opts),
            Command::Remove(opts) => run_remove(session, opts),
            Command::List => run_list(session),
            Command::Sync(opts) => run_sync(session, opts),
            Command::Status => run_status(session),
            Command::Scan(opts) => run_scan(session, opts),
            Command::SetPath(opts) => run_set_path(session, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create tracking document with default base paths.
    #[command(override_usage = "devrepo init [options]")]
    Init,

    /// Track repository at target path.
    #[command(override_usage = "devrepo add [options] <path>")]
    Add(AddOptions),

    /// Stop tracking repository.
    #[command(override_usage = "devrepo remove [options] <name>")]
    Remove(RemoveOptions),

    /// List tracked repositories.
    #[command(override_usage = "devrepo list [options]")]
    List,

    /// Clone tracked repositories missing from the base path.
    #[command(override_usage = "devrepo sync [options]")]
    Sync(SyncCliOptions),

    /// Show which tracked repositories exist on this machine.
    #[command(override_usage = "devrepo status [options]")]
    Status,

    /// Track every repository found under target directory.
    #[command(override_usage = "devrepo scan [options] [path]")]
    Scan(ScanOptions),

    /// Set base path of target operating system.
    #[command(override_usage = "devrepo set-path [options] <os> <path>")]
    SetPath(SetPathOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Path to git repository.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Name of tracked repository.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncCliOptions {
    /// Offer to switch stale checkouts back to their default branch.
    #[arg(long)]
    pub check_stale: bool,

    /// Fast-forward the repository holding the tracking document first.
    #[arg(long)]
    pub pull_config: bool,

    /// Cancel clones that take longer than this many seconds.
    #[arg(long, value_name = "secs")]
    pub clone_timeout: Option<u64>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ScanOptions {
    /// Directory to scan instead of the base path.
    #[arg(value_name = "path")]
    pub path: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetPathOptions {
    /// One of linux, darwin, or windows.
    #[arg(required = true, value_name = "os")]
    pub os: String,

    /// Base path to clone repositories into.
    #[arg(required = true, value_name = "path")]
    pub path: String,
}

struct Session {
    store: ConfigStore,
    workspace: Option<PathBuf>,
}

impl Session {
    fn open(self, cloner: Git2Cloner) -> Result<Tracker> {
        let tracker =
            Tracker::open(self.store, OsKind::current(), cloner)?.with_workspace(self.workspace);
        Ok(tracker)
    }
}

fn main() {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_init(session: Session) -> Result<()> {
    let path = session.store.path().to_path_buf();
    if session.store.initialize()? {
        println!("Created config at {}", path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }

    Ok(())
}

fn run_add(session: Session, opts: AddOptions) -> Result<()> {
    let mut tracker = session.open(Git2Cloner::new())?;
    let report = tracker.add(&opts.path)?;

    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    let verb = if report.replaced { "Updated" } else { "Added" };
    println!("{verb}: {}", report.record.name);
    if !report.record.remote_url.is_empty() {
        println!("  Remote: {}", report.record.remote_url);
    }

    Ok(())
}

fn run_remove(session: Session, opts: RemoveOptions) -> Result<()> {
    let mut tracker = session.open(Git2Cloner::new())?;
    let record = tracker.remove(&opts.name)?;
    println!("Removed: {}", record.name);

    Ok(())
}

fn run_list(session: Session) -> Result<()> {
    let tracker = session.open(Git2Cloner::new())?;
    let entries = tracker.list();
    if entries.is_empty() {
        println!("No repositories tracked.");
        return Ok(());
    }

    println!("Tracked repositories ({}):", entries.len());
    println!();
    for entry in entries {
        println!("  {}", entry.name);
        println!("    Remote: {}", entry.remote);
        println!("    Added: {}", entry.added_at);
        println!();
    }

    Ok(())
}

fn run_sync(session: Session, opts: SyncCliOptions) -> Result<()> {
    let cloner = Git2Cloner::new()
        .with_progress(true)
        .with_timeout(opts.clone_timeout.map(Duration::from_secs));
    let mut tracker = session.open(cloner)?;

    if opts.pull_config {
        report_pull(tracker.pull_config()?, tracker.config_path());
    }

    let report = tracker.sync(&SyncOptions {
        check_stale: opts.check_stale,
    })?;
    println!("Syncing into {}", report.base_path.display());
    println!();

    for entry in &report.entries {
        match &entry.outcome {
            SyncOutcome::Synced => println!("  [CLONED] {}", entry.name),
            SyncOutcome::Skipped { stale } => {
                println!("  [SKIP] {} (already exists)", entry.name);
                if let (Some(stale), Some(target)) = (stale, &entry.target) {
                    offer_switch(&entry.name, target, stale);
                }
            }
            SyncOutcome::Failed(failure) => println!("  [FAIL] {}: {failure}", entry.name),
        }
    }

    println!();
    println!(
        "Synced: {} | Skipped: {} | Failed: {}",
        report.synced(),
        report.skipped(),
        report.failed()
    );

    Ok(())
}

fn run_status(session: Session) -> Result<()> {
    let tracker = session.open(Git2Cloner::new())?;
    let report = tracker.status()?;

    println!("Base path: {}", report.base_path.display());
    println!();
    for entry in &report.entries {
        if entry.present {
            println!("  [OK] {}", entry.name);
        } else if entry.target.is_none() {
            println!("  [X] {} (invalid name)", entry.name);
        } else {
            println!("  [X] {} (missing)", entry.name);
        }
    }
    println!();
    println!(
        "Present: {} | Missing: {}",
        report.present(),
        report.missing()
    );

    Ok(())
}

fn run_scan(session: Session, opts: ScanOptions) -> Result<()> {
    let mut tracker = session.open(Git2Cloner::new())?;
    let report = tracker.scan(opts.path.as_deref())?;

    println!("Scanning {}", report.root.display());
    println!();
    for added in &report.added {
        println!("  [ADDED] {}", added.record.name);
        for warning in &added.warnings {
            println!("    Warning: {warning}");
        }
    }
    for warning in &report.warnings {
        println!("  Warning: {warning}");
    }
    for failure in &report.failures {
        println!("  [FAIL] {}: {}", failure.path.display(), failure.error);
    }
    println!();
    println!(
        "Added: {} | Failed: {}",
        report.added.len(),
        report.failures.len()
    );

    Ok(())
}

fn run_set_path(session: Session, opts: SetPathOptions) -> Result<()> {
    let mut tracker = session.open(Git2Cloner::new())?;
    let os = tracker.set_base_path(&opts.os, opts.path.as_str())?;
    println!("Set {os} base path to {}", opts.path);

    Ok(())
}

fn report_pull(outcome: PullOutcome, config_path: &Path) {
    match outcome {
        PullOutcome::Updated => println!("Config repository is up to date."),
        PullOutcome::Ahead => {
            println!("Config repository has unpushed commits, push them when convenient.")
        }
        PullOutcome::LocalChanges => println!(
            "Config repository has local changes, commit them when convenient: {}",
            config_path.display()
        ),
        PullOutcome::Failed(reason) => warn!("cannot pull config repository: {reason}"),
    }
}

fn offer_switch(name: &str, target: &Path, stale: &StaleBranch) {
    println!(
        "    '{}' is {} days old and not on '{}'",
        stale.current, stale.age_days, stale.default
    );

    let prompt = format!("Switch {name} to '{}'? Local changes are discarded.", stale.default);
    match Confirm::new(&prompt).with_default(false).prompt() {
        Ok(true) => match git::switch_to_default_branch(target, &stale.default) {
            Ok(()) => println!("    Switched to '{}'", stale.default),
            Err(err) => warn!("cannot switch {name} to {}: {err}", stale.default),
        },
        Ok(false) => {}
        Err(err) => warn!("skip branch switch for {name}: {err}"),
    }
}
