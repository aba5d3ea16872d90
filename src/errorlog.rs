//! Timestamped error artifacts for startup failures.
//!
//! A startup failure is surfaced to the operator with full diagnostic detail
//! and persisted to a text file named after the failure instant, so the
//! error survives the process. The process does not retry automatically.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// Write `error` (with its full source chain) to a timestamped file under
/// `dir`, creating the directory if needed. Returns the artifact path.
pub fn write_error_artifact(
    dir: &Path,
    error: &(dyn std::error::Error + 'static),
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let filename = format!("{}.txt", Utc::now().format("%m_%d_%Y_%H_%M_%S"));
    let path = dir.join(filename);

    let mut content = format!("{}\n{error}\n", Utc::now().to_rfc3339());
    let mut source = error.source();
    while let Some(cause) = source {
        content.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }

    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: Inner,
    }

    #[derive(Debug, Error)]
    #[error("inner cause")]
    struct Inner;

    #[test]
    fn test_artifact_contains_error_chain() {
        let dir = tempfile::tempdir().unwrap();
        let error = Outer { inner: Inner };

        let path = write_error_artifact(dir.path(), &error).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.contains("outer failure"));
        assert!(content.contains("caused by: inner cause"));
        assert!(path.extension().is_some_and(|e| e == "txt"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs/errors");

        let path = write_error_artifact(&nested, &Inner).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }
}
