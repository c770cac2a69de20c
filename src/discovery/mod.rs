//! Boundary-enforced filesystem discovery.
//!
//! Enumerates concrete files under a declared root. Every candidate is
//! fully resolved; anything escaping the resolved root (via `..` or a
//! symlink) is reported as a boundary violation and skipped. The walk
//! streams entries in ascending byte-wise path order and tolerates
//! per-entry IO errors.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{Result, RexError};

/// Discovery policy knobs.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Visit dotfiles and hidden directories.
    pub include_hidden: bool,
}

/// An accepted file entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Fully resolved path, guaranteed within the root.
    pub path: PathBuf,
    /// Path relative to the root, for custodian derivation and display.
    pub relative: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// One event from the discovery stream.
#[derive(Debug)]
pub enum Discovered {
    Entry(FileEntry),
    /// A candidate resolved outside the root; carries the original path
    /// and where it actually pointed.
    BoundaryViolation { path: PathBuf, resolved: PathBuf },
    /// Per-entry IO failure; the walk continues.
    IoSkipped { path: PathBuf, reason: String },
}

/// Streaming walker over a canonicalized root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: DiscoveryConfig,
}

impl Walker {
    /// Canonicalize the root once. Errors if the root itself is missing.
    pub fn new(root: &Path, config: DiscoveryConfig) -> Result<Self> {
        let root = std::fs::canonicalize(root).map_err(|e| {
            RexError::ConfigError(format!("cannot resolve root '{}': {}", root.display(), e))
        })?;
        Ok(Self { root, config })
    }

    /// The canonical root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stream discovery events in ascending byte-wise path order.
    ///
    /// Siblings are ordered so that the emitted file paths are globally
    /// byte-ordered: a directory sorts as its name plus `/`, which is how
    /// its children's full paths will compare against sibling files.
    pub fn discover(&self) -> impl Iterator<Item = Discovered> + '_ {
        let include_hidden = self.config.include_hidden;
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by(|a, b| {
                let ka = sort_key(a.file_name().as_encoded_bytes(), a.file_type().is_dir());
                let kb = sort_key(b.file_name().as_encoded_bytes(), b.file_type().is_dir());
                compare_keys(&ka, &kb)
            })
            .into_iter()
            .filter_entry(move |entry| {
                include_hidden || entry.depth() == 0 || !is_hidden(entry.file_name())
            })
            .filter_map(move |entry| self.accept(entry))
    }

    fn accept(&self, entry: walkdir::Result<walkdir::DirEntry>) -> Option<Discovered> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                tracing::warn!("skipping unreadable entry {}: {}", path.display(), e);
                return Some(Discovered::IoSkipped {
                    path,
                    reason: e.to_string(),
                });
            }
        };
        // Directories are traversal structure, not entries. Symlinks to
        // directories are not followed and fall through to the boundary
        // check below like any other symlink.
        if entry.file_type().is_dir() {
            return None;
        }
        let path = entry.path();
        let resolved = match std::fs::canonicalize(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), e);
                return Some(Discovered::IoSkipped {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };
        if !resolved.starts_with(&self.root) {
            tracing::warn!(
                "boundary violation: {} resolves to {} outside {}",
                path.display(),
                resolved.display(),
                self.root.display()
            );
            return Some(Discovered::BoundaryViolation {
                path: path.to_path_buf(),
                resolved,
            });
        }
        if !resolved.is_file() {
            return None;
        }
        let meta = match std::fs::metadata(&resolved) {
            Ok(meta) => meta,
            Err(e) => {
                return Some(Discovered::IoSkipped {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        let mtime: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_path_buf();
        Some(Discovered::Entry(FileEntry {
            path: resolved,
            relative,
            size: meta.len(),
            mtime,
        }))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn sort_key(name: &[u8], is_dir: bool) -> Vec<u8> {
    let mut key = name.to_vec();
    if is_dir {
        key.push(b'/');
    }
    key
}

fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(walker: &Walker) -> Vec<FileEntry> {
        walker
            .discover()
            .filter_map(|d| match d {
                Discovered::Entry(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_walk_is_byte_ordered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a").join("b.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("z.txt"), b"3").unwrap();

        let walker = Walker::new(dir.path(), DiscoveryConfig::default()).unwrap();
        let got: Vec<PathBuf> = entries(&walker).into_iter().map(|e| e.relative).collect();
        // Byte-wise: "a.txt" < "a/b.txt" < "z.txt" ('.' sorts before '/').
        assert_eq!(
            got,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("a/b.txt"),
                PathBuf::from("z.txt")
            ]
        );
    }

    #[test]
    fn test_hidden_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".secret"), b"x").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("config"), b"x").unwrap();
        std::fs::write(dir.path().join("visible.txt"), b"x").unwrap();

        let walker = Walker::new(dir.path(), DiscoveryConfig::default()).unwrap();
        let got = entries(&walker);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].relative, PathBuf::from("visible.txt"));

        let walker = Walker::new(
            dir.path(),
            DiscoveryConfig {
                include_hidden: true,
            },
        )
        .unwrap();
        assert_eq!(entries(&walker).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_is_violation() {
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("hostname");
        std::fs::write(&target, b"leaked").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"fine").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("leak")).unwrap();

        let walker = Walker::new(dir.path(), DiscoveryConfig::default()).unwrap();
        let mut files = Vec::new();
        let mut violations = Vec::new();
        for event in walker.discover() {
            match event {
                Discovered::Entry(e) => files.push(e),
                Discovered::BoundaryViolation { path, resolved } => {
                    violations.push((path, resolved))
                }
                Discovered::IoSkipped { .. } => {}
            }
        }
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("a.txt"));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].0.ends_with("leak"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let walker = Walker::new(dir.path(), DiscoveryConfig::default()).unwrap();
        let got = entries(&walker);
        // Both names appear; both resolve inside the root.
        assert_eq!(got.len(), 2);
        for entry in got {
            assert!(entry.path.starts_with(walker.root()));
        }
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let err = Walker::new(Path::new("/no/such/root"), DiscoveryConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
