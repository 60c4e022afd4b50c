//! Test helpers that build a sample directory on disk.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use tempfile::TempDir;
use wayfare_core::{
    DirectoryStore, ProgressRecord, SqliteDirectoryStore,
    test_support::{SampleDirectory, fixture_time, location},
};

pub(super) struct DirectoryFiles {
    _dir: TempDir,
    database: Utf8PathBuf,
    root: Utf8PathBuf,
}

impl DirectoryFiles {
    /// A sample directory persisted to `directory.db`.
    pub(super) fn sample() -> Self {
        let files = Self::empty();
        let store = SqliteDirectoryStore::open(&files.database).expect("open directory");
        SampleDirectory::populate(store).expect("populate directory");
        files
    }

    /// A workspace with no database file.
    pub(super) fn empty() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        let database = root.join("directory.db");
        Self {
            _dir: dir,
            database,
            root,
        }
    }

    pub(super) fn database(&self) -> &Utf8Path {
        &self.database
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Add an abandoned submission, a live one, and a location row whose
    /// app does not exist.
    pub(super) fn add_leftovers(&self) {
        let mut store = SqliteDirectoryStore::open(&self.database).expect("reopen directory");
        let abandoned = ProgressRecord::new("0123456789abcdef0123456789abcdef", fixture_time());
        let live = ProgressRecord::new("fedcba9876543210fedcba9876543210", Utc::now());
        store.put_progress(&abandoned).expect("write abandoned progress");
        store.put_progress(&live).expect("write live progress");
        store
            .put_location(&location(900, 900, "Berlin", 52.523_405_1, 13.411_399_9))
            .expect("write orphan row");
    }
}

/// Split captured output into JSON values, one per line.
pub(super) fn json_lines(output: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8(output.to_vec())
        .expect("stdout utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

/// Titles of the apps in captured output.
pub(super) fn titles(output: &[u8]) -> Vec<String> {
    json_lines(output)
        .iter()
        .map(|value| value["title"].as_str().expect("title field").to_owned())
        .collect()
}
