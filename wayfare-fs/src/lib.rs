//! Capability-scoped filesystem helpers for Wayfare artefacts.
//!
//! Paths are UTF-8 (`camino`) and every operation goes through a `cap-std`
//! directory handle opened with ambient authority at the nearest root, so
//! callers never touch `std::fs` directly.
#![forbid(unsafe_code)]

use std::io;
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Create every missing directory above `path`.
///
/// Paths without a parent, or whose parent is the filesystem root, need no
/// work.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() {
        return Ok(());
    }
    let (root, relative) = split_at_root(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    root.create_dir_all(&relative)
}

/// What a path names on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Nothing, or a parent directory is missing.
    Missing,
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else, such as a socket or device node.
    Other,
}

/// Inspect `path` through a handle on its parent directory.
pub fn entry_kind(path: &Utf8Path) -> io::Result<EntryKind> {
    let Some(name) = path.file_name() else {
        return match Dir::open_ambient_dir(path, ambient_authority()) {
            Ok(_) => Ok(EntryKind::Directory),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Missing),
            Err(error) => Err(error),
        };
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(EntryKind::Missing),
        Err(error) => return Err(error),
    };
    match dir.metadata(name) {
        Ok(meta) if meta.is_file() => Ok(EntryKind::File),
        Ok(meta) if meta.is_dir() => Ok(EntryKind::Directory),
        Ok(_) => Ok(EntryKind::Other),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Missing),
        Err(error) => Err(error),
    }
}

/// Open the directory a path is anchored at and return the remainder.
///
/// Absolute paths anchor at the root (or drive prefix on Windows); relative
/// paths anchor at the working directory.
fn split_at_root(path: &Utf8Path) -> io::Result<(Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();
    let (root, relative) = match std_path.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let root = Utf8PathBuf::from(format!("{prefix}{}", std::path::MAIN_SEPARATOR));
            let relative = path
                .strip_prefix(&root)
                .or_else(|_| path.strip_prefix(prefix))
                .map_err(|_| io::Error::other("failed to strip drive prefix"))?;
            (root, relative.to_path_buf())
        }
        Some(Component::RootDir) => {
            let root = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = path
                .strip_prefix(&root)
                .map_err(|_| io::Error::other("failed to strip filesystem root"))?;
            (root, relative.to_path_buf())
        }
        _ => (Utf8PathBuf::from("."), path.to_path_buf()),
    };
    let dir = Dir::open_ambient_dir(&root, ambient_authority())?;
    Ok((dir, relative))
}
