//! JSON file output.
//!
//! Feed files are replaced wholesale each run. Writes go to a temporary
//! sibling first and are renamed over the destination, so the dashboard never
//! reads a half-written document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while writing output files.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Creating directories or writing the file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl OutputError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
///
/// Parent directories are created as needed. Non-ASCII text is written as
/// UTF-8, not escaped.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| OutputError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;
    }

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, content).map_err(|e| OutputError::io(&temp_path, e))?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(OutputError::io(path, e));
    }

    debug!("wrote {}", path.display());
    Ok(())
}

/// Resolves a configured output location.
///
/// `"."` or an existing directory means `<dir>/<default_file_name>`; anything
/// else is taken as the file path itself.
pub fn resolve_output_path(configured: &str, default_file_name: &str) -> PathBuf {
    let path = PathBuf::from(configured);
    if configured == "." || path.is_dir() {
        path.join(default_file_name)
    } else {
        path
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("nested").join("feed.json");

        write_json(&path, &serde_json::json!({"title": "Straßenbahn"})).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Straßenbahn"));
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, "{\"old\": true, \"padding\": \"xxxxxxxxxxxxxxxx\"}").unwrap();

        write_json(&path, &serde_json::json!({"new": true})).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"new": true}));
    }

    #[test]
    fn write_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result = write_json(&blocker.join("feed.json"), &serde_json::json!({}));
        assert!(matches!(result, Err(OutputError::Io { .. })));
    }

    #[test]
    fn output_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        assert_eq!(
            resolve_output_path(".", "vrr_data.json"),
            PathBuf::from("./vrr_data.json")
        );
        assert_eq!(
            resolve_output_path(dir_str, "vrr_data.json"),
            dir.path().join("vrr_data.json")
        );
        assert_eq!(
            resolve_output_path("/srv/dashy/transit.json", "vrr_data.json"),
            PathBuf::from("/srv/dashy/transit.json")
        );
    }
}
