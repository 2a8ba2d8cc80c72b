// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository discovery.
//!
//! Tracked repositories live at the top of a base path, or one level down
//! inside an enlistment. Discovery only walks that deep. Walking any further
//! would mean reading every file of every repository, and would pick up
//! vendored repositories and submodules that are not worth tracking on their
//! own.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// How many directory levels below the scan root are searched.
pub const SCAN_DEPTH: usize = 2;

/// Name of the git metadata entry that marks a repository.
pub const GIT_DIR: &str = ".git";

/// Find git repositories underneath target root.
///
/// The root itself is never reported. Directories inside a repository that
/// was already found are not reported either. Symbolic links are not
/// followed. Results are ordered by path.
#[instrument(skip(root), level = "debug")]
pub fn find_repositories(root: impl AsRef<Path>, max_depth: usize) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root.as_ref())
        .standard_filters(false)
        .follow_links(false)
        .max_depth(Some(max_depth))
        .sort_by_file_name(|lhs, rhs| lhs.cmp(rhs))
        .filter_entry(|entry| entry.file_name() != GIT_DIR)
        .build();

    let mut found: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skip unreadable entry: {err}");
                continue;
            }
        };

        if entry.depth() == 0 || !entry.file_type().is_some_and(|kind| kind.is_dir()) {
            continue;
        }

        let path = entry.path();
        if found.iter().any(|repo| path.starts_with(repo)) {
            continue;
        }

        if is_repository(path) {
            debug!("found repository at {:?}", path.display());
            found.push(path.to_path_buf());
        }
    }

    found
}

/// Check if target directory carries git metadata.
///
/// Accepts both a `.git` directory and a `.git` file, as used by worktrees
/// and submodules.
pub fn is_repository(path: impl AsRef<Path>) -> bool {
    path.as_ref().join(GIT_DIR).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};
    use tempfile::TempDir;

    fn make_repo(path: &Path) -> anyhow::Result<()> {
        create_dir_all(path.join(GIT_DIR))?;
        Ok(())
    }

    #[test]
    fn find_repositories_respects_depth() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let base = root.path();
        make_repo(&base.join("foo"))?;
        make_repo(&base.join("edge").join("src"))?;
        make_repo(&base.join("deep").join("er").join("repo"))?;
        create_dir_all(base.join("plain"))?;
        write(base.join("file.txt"), "not a dir")?;

        let result = find_repositories(base, SCAN_DEPTH);
        let expect = vec![base.join("edge").join("src"), base.join("foo")];
        assert_eq!(result, expect);

        let result = find_repositories(base, 3);
        assert!(result.contains(&base.join("deep").join("er").join("repo")));

        Ok(())
    }

    #[test]
    fn find_repositories_skips_nested_repositories() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let base = root.path();
        make_repo(&base.join("foo"))?;
        make_repo(&base.join("foo").join("vendored"))?;
        create_dir_all(base.join("bar").join("sub"))?;
        write(base.join("bar").join("sub").join(GIT_DIR), "gitdir: ../../x")?;

        let result = find_repositories(base, SCAN_DEPTH);
        let expect = vec![base.join("bar").join("sub"), base.join("foo")];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn find_repositories_ignores_root() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        make_repo(root.path())?;

        assert!(find_repositories(root.path(), SCAN_DEPTH).is_empty());

        Ok(())
    }
}
