//! Crash-safe JSON document writes.
//!
//! The document is serialised into a temporary file created in the target's
//! own directory, flushed and fsynced, then renamed over the target.  The
//! rename is atomic on the same filesystem, so a crash leaves either the
//! previous document or the new one, never a truncated mix.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised while writing a document to disk.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialise `value` as pretty JSON and atomically replace `path` with it.
///
/// Missing parent directories are created.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &json!({"v": 1})).expect("first write");
        write_json_atomic(&path, &json!({"v": 2})).expect("second write");

        let raw = fs::read_to_string(&path).unwrap();
        let back: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(back["v"], 2);
        // Only the target remains; the temp file was renamed, not copied.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("deeper").join("doc.json");
        write_json_atomic(&path, &json!([1, 2, 3])).expect("write");
        assert!(path.exists());
    }

    #[test]
    fn failed_write_keeps_previous_document() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &json!({"v": "good"})).unwrap();

        // Non-string map keys make serde_json fail mid-serialisation.
        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1);
        assert!(write_json_atomic(&path, &bad).is_err());

        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["v"], "good");
    }
}
