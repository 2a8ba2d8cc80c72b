// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Track git repositories and reclone them on another machine.
//!
//! Devrepo remembers which git repositories a developer works in, along with
//! the remote each one came from, in a single JSON document. That document can
//! be carried to a fresh machine, e.g., through a dotfiles repository, and
//! used there to clone every missing repository into the same layout under a
//! per-OS __base path__.
//!
//! See [`tracker`] for the operations on tracked repositories, [`config`] for
//! the layout of the tracking document, and [`store`] for how it is kept on
//! disk.

pub mod config;
pub mod path;
pub mod store;
pub mod tracker;

pub use config::{BasePaths, OsKind, RepoRecord, TrackerConfig};
pub use store::ConfigStore;
pub use tracker::{
    clone::{Cloner, Git2Cloner},
    Tracker,
};
