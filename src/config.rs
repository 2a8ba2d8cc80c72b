// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the tracking document that devrepo uses to remember
//! repositories across machines. The document is plain JSON so that it can
//! live inside a dotfiles repository and be edited by hand. File I/O is left
//! to [`crate::store`].
//!
//! # General Layout
//!
//! The tracking document is composed of three basic parts: a schema version,
//! a table of __base paths__ keyed by operating system, and an ordered list of
//! __repository records__. A base path is the directory under which tracked
//! repositories are cloned on a given operating system. A repository record
//! names a repository and remembers where to clone it from.
//!
//! ```json
//! {
//!   "version": 1,
//!   "defaultBasePaths": { "linux": "/workspace", "darwin": "/workspace", "windows": "C:\\dev" },
//!   "repos": [
//!     { "name": "edge/src", "remoteUrl": "https://example.org/src.git", "addedFrom": "/workspace/edge/src", "addedAt": "2025-01-01T00:00:00Z" }
//!   ]
//! }
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Current schema version of the tracking document.
pub const CONFIG_VERSION: u32 = 1;

/// Description written into freshly initialized tracking documents.
pub const DEFAULT_DESCRIPTION: &str = "Tracked repositories for cross-machine sync";

/// Repository tracking document.
///
/// # Invariant
///
/// - No two repository records share the same name.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Schema version of the document.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Free form note about what the document is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Directory to clone tracked repositories into, per operating system.
    #[serde(default)]
    pub default_base_paths: BasePaths,

    /// Tracked repositories in storage order.
    #[serde(default)]
    pub repos: Vec<RepoRecord>,
}

impl TrackerConfig {
    /// Find repository record by name.
    pub fn find_repo(&self, name: impl AsRef<str>) -> Option<&RepoRecord> {
        self.repos.iter().find(|repo| repo.name == name.as_ref())
    }

    /// Insert repository record, replacing any record with the same name.
    ///
    /// The new record is always appended to the end of the listing. Returns
    /// the record that was replaced, if any.
    pub fn upsert_repo(&mut self, record: RepoRecord) -> Option<RepoRecord> {
        let replaced = self.remove_repo(&record.name);
        self.repos.push(record);
        replaced
    }

    /// Remove every repository record with target name.
    ///
    /// Returns the last record removed, if any.
    pub fn remove_repo(&mut self, name: impl AsRef<str>) -> Option<RepoRecord> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.repos)
            .into_iter()
            .partition(|repo| repo.name == name.as_ref());
        self.repos = kept;
        removed.into_iter().last()
    }

    /// Drop records whose name reappears later in the listing.
    ///
    /// The last record with a given name wins, matching what a later add
    /// would have done.
    fn dedup_repos(&mut self) {
        let mut seen = HashSet::new();
        let mut kept: Vec<RepoRecord> = std::mem::take(&mut self.repos)
            .into_iter()
            .rev()
            .filter(|repo| seen.insert(repo.name.clone()))
            .collect();
        kept.reverse();
        self.repos = kept;
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            description: Some(DEFAULT_DESCRIPTION.into()),
            default_base_paths: BasePaths::builtin(),
            repos: Vec::new(),
        }
    }
}

impl FromStr for TrackerConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Self = serde_json::from_str(data).map_err(ConfigError::Deserialize)?;
        config.dedup_repos();
        Ok(config)
    }
}

impl Display for TrackerConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut data = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        data.push('\n');
        fmt.write_str(data.as_str())
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Base path listing per operating system.
///
/// Base paths are stored exactly as the user wrote them. Shell expansion is
/// only performed when a base path is resolved for use.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BasePaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub darwin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<String>,
}

impl BasePaths {
    /// Built-in base paths used for new tracking documents.
    pub fn builtin() -> Self {
        Self {
            linux: Some("/workspace".into()),
            darwin: Some("/workspace".into()),
            windows: Some("C:\\dev".into()),
        }
    }

    /// Raw base path configured for target operating system.
    pub fn get(&self, os: OsKind) -> Option<&str> {
        match os {
            OsKind::Linux => self.linux.as_deref(),
            OsKind::Darwin => self.darwin.as_deref(),
            OsKind::Windows => self.windows.as_deref(),
        }
    }

    /// Set base path of target operating system.
    pub fn set(&mut self, os: OsKind, path: impl Into<String>) {
        let slot = match os {
            OsKind::Linux => &mut self.linux,
            OsKind::Darwin => &mut self.darwin,
            OsKind::Windows => &mut self.windows,
        };
        *slot = Some(path.into());
    }

    /// Resolve base path of target operating system.
    ///
    /// Performs shell expansion on the raw base path, e.g., `~/src` or
    /// `$HOME/src`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if a referenced variable is
    ///   not set.
    pub fn resolve(&self, os: OsKind) -> Result<Option<PathBuf>> {
        let Some(raw) = self.get(os) else {
            return Ok(None);
        };

        let expanded = shellexpand::full(raw).map_err(ConfigError::ShellExpansion)?;
        Ok(Some(PathBuf::from(expanded.into_owned())))
    }
}

/// Tracked repository entry.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRecord {
    /// Unique tracking key. May contain one `/` for repositories that live
    /// inside an enlistment, e.g., `edge/src`.
    pub name: String,

    /// URL of the `origin` remote. Empty if the repository had no origin.
    #[serde(default)]
    pub remote_url: String,

    /// Absolute path the repository was added from.
    #[serde(default)]
    pub added_from: String,

    /// When the repository was last added.
    ///
    /// Timestamps that cannot be read are treated as unknown rather than
    /// failing the whole document.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub added_at: Option<DateTime<Utc>>,
}

impl RepoRecord {
    /// Where this repository belongs underneath a base path.
    ///
    /// Each `/` separated component of the name becomes its own directory.
    /// Returns `None` if the name could escape the base path, e.g.,
    /// `../x` or `/abs`.
    pub fn target_path(&self, base_path: impl AsRef<Path>) -> Option<PathBuf> {
        if !is_safe_name(&self.name) {
            return None;
        }

        let path = self
            .name
            .split('/')
            .fold(base_path.as_ref().to_path_buf(), |path, component| {
                path.join(component)
            });
        Some(path)
    }
}

/// Check that repository name is a plain relative path.
///
/// Every `/` separated component must be a single normal path component.
/// Empty, `.`, `..`, and rooted or prefixed components are rejected.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('/').all(|component| {
            !component.contains('\\')
                && matches!(
                    Path::new(component).components().collect::<Vec<_>>().as_slice(),
                    [Component::Normal(normal)] if *normal == component
                )
        })
}

/// Read `addedAt` as RFC 3339, a timestamp without offset (taken as UTC), or
/// a bare date.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Parse ISO 8601 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Operating systems that can be given a base path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsKind {
    Linux,
    Darwin,
    Windows,
}

impl OsKind {
    /// Every recognized operating system.
    pub const ALL: [OsKind; 3] = [OsKind::Linux, OsKind::Darwin, OsKind::Windows];

    /// Operating system this binary was built for.
    ///
    /// Anything that is neither Windows nor macOS is treated as Linux.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }

    /// Identifier used in the tracking document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl FromStr for OsKind {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|os| os.as_str() == data)
            .ok_or_else(|| ConfigError::UnsupportedOs(data.into()))
    }
}

impl Display for OsKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(serde_json::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Operating system identifier is not one of linux, darwin, or windows.
    #[error("unsupported operating system {0:?}, expected one of linux, darwin, windows")]
    UnsupportedOs(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn record(name: &str, url: &str) -> RepoRecord {
        RepoRecord {
            name: name.into(),
            remote_url: url.into(),
            added_from: format!("/workspace/{name}"),
            added_at: None,
        }
    }

    #[test]
    fn deserialize_tracker_config() -> anyhow::Result<()> {
        let result: TrackerConfig = r#"
            {
              "version": 1,
              "description": "blah blah blah",
              "defaultBasePaths": { "linux": "/workspace", "windows": "C:\\dev" },
              "repos": [
                {
                  "name": "edge/src",
                  "remoteUrl": "https://blah.org/src.git",
                  "addedFrom": "/workspace/edge/src",
                  "addedAt": "2025-03-04T05:06:07+00:00"
                },
                { "name": "foo" }
              ]
            }
        "#
        .parse()?;

        let expect = TrackerConfig {
            version: 1,
            description: Some("blah blah blah".into()),
            default_base_paths: BasePaths {
                linux: Some("/workspace".into()),
                darwin: None,
                windows: Some("C:\\dev".into()),
            },
            repos: vec![
                RepoRecord {
                    name: "edge/src".into(),
                    remote_url: "https://blah.org/src.git".into(),
                    added_from: "/workspace/edge/src".into(),
                    added_at: Some(Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()),
                },
                RepoRecord {
                    name: "foo".into(),
                    remote_url: String::new(),
                    added_from: String::new(),
                    added_at: None,
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_empty_document_uses_defaults() -> anyhow::Result<()> {
        let result: TrackerConfig = "{}".parse()?;
        assert_eq!(result.version, CONFIG_VERSION);
        assert_eq!(result.default_base_paths, BasePaths::default());
        assert!(result.repos.is_empty());

        Ok(())
    }

    #[test]
    fn deserialize_rejects_wrong_shape() {
        let result = r#"{ "repos": "not a list" }"#.parse::<TrackerConfig>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_tracker_config() {
        let mut config = TrackerConfig::default();
        config.repos.push(RepoRecord {
            name: "foo".into(),
            remote_url: "https://blah.org/foo.git".into(),
            added_from: "/workspace/foo".into(),
            added_at: Some(Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()),
        });
        let result = config.to_string();

        let expect = indoc! {r#"
            {
              "version": 1,
              "description": "Tracked repositories for cross-machine sync",
              "defaultBasePaths": {
                "linux": "/workspace",
                "darwin": "/workspace",
                "windows": "C:\\dev"
              },
              "repos": [
                {
                  "name": "foo",
                  "remoteUrl": "https://blah.org/foo.git",
                  "addedFrom": "/workspace/foo",
                  "addedAt": "2025-03-04T05:06:07Z"
                }
              ]
            }
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn upsert_repo_keeps_names_unique() {
        let mut config = TrackerConfig::default();
        assert_eq!(config.upsert_repo(record("foo", "a")), None);
        assert_eq!(config.upsert_repo(record("bar", "b")), None);

        let replaced = config.upsert_repo(record("foo", "c"));
        assert_eq!(replaced, Some(record("foo", "a")));

        let names: Vec<_> = config.repos.iter().map(|repo| repo.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo"]);
        assert_eq!(config.find_repo("foo").map(|r| r.remote_url.as_str()), Some("c"));
    }

    #[test]
    fn remove_repo_by_name() {
        let mut config = TrackerConfig::default();
        config.upsert_repo(record("foo", "a"));

        assert_eq!(config.remove_repo("bar"), None);
        assert_eq!(config.remove_repo("foo"), Some(record("foo", "a")));
        assert!(config.repos.is_empty());
    }

    #[test]
    fn target_path_nests_enlistment_names() {
        let result = record("edge/src", "").target_path("/workspace");
        assert_eq!(result, Some(Path::new("/workspace").join("edge").join("src")));

        let result = record("foo", "").target_path("/workspace");
        assert_eq!(result, Some(Path::new("/workspace").join("foo")));
    }

    #[test_case("../../etc/x"; "parent escape")]
    #[test_case("/abs"; "absolute")]
    #[test_case("edge/../x"; "inner parent")]
    #[test_case("./foo"; "current dir")]
    #[test_case("edge//src"; "empty component")]
    #[test_case("a\\b"; "backslash")]
    #[test_case(""; "empty")]
    #[test]
    fn target_path_rejects_unsafe_names(name: &str) {
        assert!(!is_safe_name(name));
        assert_eq!(record(name, "").target_path("/workspace"), None);
    }

    #[test]
    fn deserialize_dedups_names_keeping_last() -> anyhow::Result<()> {
        let result: TrackerConfig = r#"
            {
              "repos": [
                { "name": "foo", "remoteUrl": "https://blah.org/old.git" },
                { "name": "bar", "remoteUrl": "https://blah.org/bar.git" },
                { "name": "foo", "remoteUrl": "https://blah.org/new.git" }
              ]
            }
        "#
        .parse()?;

        let names: Vec<_> = result.repos.iter().map(|repo| repo.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo"]);
        assert_eq!(
            result.find_repo("foo").map(|repo| repo.remote_url.as_str()),
            Some("https://blah.org/new.git")
        );

        Ok(())
    }

    #[test]
    fn upsert_and_remove_clear_every_duplicate() {
        let mut config = TrackerConfig::default();
        config.repos = vec![record("foo", "a"), record("bar", "b"), record("foo", "c")];

        assert_eq!(config.upsert_repo(record("foo", "d")), Some(record("foo", "c")));
        assert_eq!(config.repos, vec![record("bar", "b"), record("foo", "d")]);

        config.repos.push(record("bar", "e"));
        assert_eq!(config.remove_repo("bar"), Some(record("bar", "e")));
        assert_eq!(config.repos, vec![record("foo", "d")]);
    }

    #[test_case("2025-03-04T05:06:07Z"; "rfc 3339 utc")]
    #[test_case("2025-03-04T07:06:07+02:00"; "rfc 3339 offset")]
    #[test_case("2025-03-04T05:06:07"; "no offset")]
    #[test_case("2025-03-04T05:06:07.000"; "no offset with fraction")]
    #[test_case("2025-03-04 05:06:07"; "space separated")]
    #[test]
    fn parse_timestamp_accepts_iso_8601(raw: &str) {
        let expect = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single();
        assert_eq!(parse_timestamp(raw), expect);
    }

    #[test]
    fn deserialize_tolerates_loose_timestamps() -> anyhow::Result<()> {
        let result: TrackerConfig = r#"
            {
              "repos": [
                { "name": "foo", "addedAt": "2025-03-04T05:06:07" },
                { "name": "bar", "addedAt": "2025-03-04" },
                { "name": "baz", "addedAt": "last tuesday" }
              ]
            }
        "#
        .parse()?;

        let times: Vec<_> = result.repos.iter().map(|repo| repo.added_at).collect();
        let expect = vec![
            Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single(),
            Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).single(),
            None,
        ];
        assert_eq!(times, expect);

        Ok(())
    }

    #[test_case("linux", OsKind::Linux; "linux")]
    #[test_case("darwin", OsKind::Darwin; "darwin")]
    #[test_case("windows", OsKind::Windows; "windows")]
    #[test]
    fn parse_os_kind(input: &str, expect: OsKind) {
        let result: OsKind = input.parse().unwrap();
        assert_eq!(result, expect);
        assert_eq!(result.to_string(), input);
    }

    #[test_case("solaris"; "unknown os")]
    #[test_case("Linux"; "wrong case")]
    #[test_case(""; "empty")]
    #[test]
    fn parse_os_kind_rejects_unsupported(input: &str) {
        let result = input.parse::<OsKind>();
        assert!(matches!(result, Err(ConfigError::UnsupportedOs(os)) if os == input));
    }

    #[test]
    fn base_paths_set_and_get() {
        let mut paths = BasePaths::default();
        assert_eq!(paths.get(OsKind::Darwin), None);

        paths.set(OsKind::Darwin, "/Users/blah/dev");
        assert_eq!(paths.get(OsKind::Darwin), Some("/Users/blah/dev"));
        assert_eq!(paths.get(OsKind::Linux), None);
    }

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn resolve_base_path_expands_variables() -> anyhow::Result<()> {
        let mut paths = BasePaths::default();
        paths.set(OsKind::Linux, "$BLAH/workspace");

        let result = paths.resolve(OsKind::Linux)?;
        assert_eq!(result, Some(PathBuf::from("/home/blah/workspace")));
        assert_eq!(paths.get(OsKind::Linux), Some("$BLAH/workspace"));
        assert_eq!(paths.resolve(OsKind::Windows)?, None);

        Ok(())
    }
}
