//! On-disk layout of the embedded backend
//!
//! ```text
//! {root}/{index}/CURRENT                 current pointer (version name)
//! {root}/{index}/{version}/              Tantivy index directory
//! {root}/{index}/{version}.meta.json     version metadata
//! ```
//!
//! Pointer and metadata files are written to a temp file in the same
//! directory and renamed into place, so readers observe either the old or
//! the new content, never a partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{RejectionKind, SyncError, SyncResult};
use crate::registry::{IndexOptions, Mapping, is_valid_index_name};

const POINTER_FILE: &str = "CURRENT";
const META_SUFFIX: &str = ".meta.json";
const VERSION_MARKER: &str = "__v";

/// Metadata persisted next to each version directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct VersionMeta {
    pub name: String,
    pub index: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub options: IndexOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,
}

/// Path helper rooted at the storage directory
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self, index: &str) -> PathBuf {
        self.root.join(index)
    }

    pub fn version_dir(&self, index: &str, version: &str) -> PathBuf {
        self.index_dir(index).join(version)
    }

    pub fn meta_path(&self, index: &str, version: &str) -> PathBuf {
        self.index_dir(index).join(format!("{version}{META_SUFFIX}"))
    }

    pub fn pointer_path(&self, index: &str) -> PathBuf {
        self.index_dir(index).join(POINTER_FILE)
    }

    pub fn read_meta(&self, index: &str, version: &str) -> SyncResult<Option<VersionMeta>> {
        let path = self.meta_path(index, version);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    pub fn write_meta(&self, meta: &VersionMeta) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        write_atomically(&self.meta_path(&meta.index, &meta.name), &bytes)
    }

    pub fn read_pointer(&self, index: &str) -> SyncResult<Option<String>> {
        let path = self.pointer_path(index);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let version = content.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    pub fn write_pointer(&self, index: &str, version: &str) -> SyncResult<()> {
        write_atomically(&self.pointer_path(index), version.as_bytes())
    }

    pub fn remove_pointer(&self, index: &str) -> SyncResult<bool> {
        let path = self.pointer_path(index);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Index names that currently have a directory under the root
    pub fn index_names(&self) -> SyncResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.root, e))?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Metadata of every complete version of `index`
    pub fn version_metas(&self, index: &str) -> SyncResult<Vec<VersionMeta>> {
        let dir = self.index_dir(index);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut metas = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(META_SUFFIX))
            else {
                continue;
            };
            // A meta file without its directory is a half-deleted version
            if !self.version_dir(index, version).is_dir() {
                continue;
            }
            if let Some(meta) = self.read_meta(index, version)? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }
}

/// Split `articles__v20101025120000000000` into (`articles`, version)
pub(crate) fn index_of_version(version: &str) -> Option<&str> {
    let (base, suffix) = version.rsplit_once(VERSION_MARKER)?;
    let digits_first = suffix.chars().next().is_some_and(|c| c.is_ascii_digit());
    (!base.is_empty() && digits_first).then_some(base)
}

/// Name for a new version of `index` created at `at`
pub(crate) fn version_name(index: &str, at: DateTime<Utc>) -> String {
    format!("{index}{VERSION_MARKER}{}", at.format("%Y%m%d%H%M%S%6f"))
}

/// Index names are used as directory names
pub(crate) fn validate_index_name(name: &str) -> SyncResult<()> {
    let valid = name != POINTER_FILE && is_valid_index_name(name);

    if valid {
        Ok(())
    } else {
        Err(SyncError::rejected(
            RejectionKind::InvalidRequest,
            format!("invalid index name '{name}'"),
        ))
    }
}

pub(crate) fn io_error(path: &Path, error: std::io::Error) -> SyncError {
    SyncError::ConnectionFailed(format!("{}: {error}", path.display()))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> SyncResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    file.write_all(bytes).map_err(|e| io_error(path, e))?;
    file.as_file().sync_all().map_err(|e| io_error(path, e))?;
    file.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn version_names_split_back_to_their_index() {
        let at = Utc::now();
        let version = version_name("admin-blog_post", at);
        assert_eq!(index_of_version(&version), Some("admin-blog_post"));
        assert_eq!(index_of_version(&format!("{version}_1")), Some("admin-blog_post"));
        assert_eq!(index_of_version("articles"), None);
        assert_eq!(index_of_version("__v2010"), None);
    }

    #[test]
    fn rejects_unsafe_index_names() {
        assert!(validate_index_name("articles").is_ok());
        assert!(validate_index_name("../etc").is_err());
        assert!(validate_index_name("Articles").is_err());
        assert!(validate_index_name("").is_err());
    }

    #[test]
    fn pointer_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let layout = Layout::new(dir.path());
        std::fs::create_dir_all(layout.index_dir("articles")).expect("index dir");

        assert_eq!(layout.read_pointer("articles").expect("read"), None);
        layout.write_pointer("articles", "articles__v1").expect("write");
        assert_eq!(
            layout.read_pointer("articles").expect("read").as_deref(),
            Some("articles__v1")
        );
        assert!(layout.remove_pointer("articles").expect("remove"));
        assert!(!layout.remove_pointer("articles").expect("remove again"));
    }
}
