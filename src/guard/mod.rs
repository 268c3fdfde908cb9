//! Access to the protected file directory.
//!
//! Callers only ever hand in a bare file name; anything that looks like a
//! path is reduced to its last component before it touches the filesystem.

pub mod security;

use crate::errors::GatewayError;
use anyhow::Context;
use security::NameValidationError;
use axum::{
    body::Body,
    http::{header, Response},
};
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProtectedFiles {
    root: PathBuf,
}

/// A file confirmed to exist inside the protected directory.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub name: String,
    pub path: PathBuf,
}

impl ProtectedFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Sanitized name for `name`, without checking the file exists.
    pub fn sanitize(name: &str) -> Result<String, NameValidationError> {
        security::safe_basename(name).map(str::to_string)
    }

    /// A name with no usable basename can never exist, so it is reported
    /// the same way as any other missing file.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedFile, GatewayError> {
        let name = match Self::sanitize(name) {
            Ok(name) => name,
            Err(e) => {
                debug!(name, reason = %e, "Rejected file name");
                return Err(GatewayError::FileNotFound(name.to_string()));
            }
        };
        let path = self.root.join(&name);

        // Directories and dangling links count as missing
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(ResolvedFile { name, path }),
            _ => Err(GatewayError::FileNotFound(name)),
        }
    }

    /// Open a resolved file and wrap it as an attachment download.
    pub async fn attachment(&self, file: &ResolvedFile) -> Result<Response<Body>, GatewayError> {
        let handle = match File::open(&file.path).await {
            Ok(handle) => handle,
            // Removed between resolve and open
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::FileNotFound(file.name.clone()))
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to open {}", file.path.display()))
                    .into())
            }
        };

        let len = handle
            .metadata()
            .await
            .context(format!("Failed to stat {}", file.path.display()))?
            .len();

        let response = Response::builder()
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, len)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.name.replace('"', "")),
            )
            .body(Body::from_stream(ReaderStream::new(handle)))
            .context("Failed to build download response")?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ProtectedFiles) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1.jpg"), b"jpeg bytes").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let files = ProtectedFiles::new(dir.path());
        (dir, files)
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let (dir, files) = fixture();
        let resolved = files.resolve("1.jpg").await.unwrap();
        assert_eq!(resolved.name, "1.jpg");
        assert_eq!(resolved.path, dir.path().join("1.jpg"));
    }

    #[tokio::test]
    async fn test_resolve_strips_directories() {
        let (_dir, files) = fixture();
        let resolved = files.resolve("../../somewhere/else/1.jpg").await.unwrap();
        assert_eq!(resolved.name, "1.jpg");
    }

    #[tokio::test]
    async fn test_resolve_missing_and_directory() {
        let (_dir, files) = fixture();
        assert!(matches!(
            files.resolve("2.jpg").await,
            Err(GatewayError::FileNotFound(name)) if name == "2.jpg"
        ));
        assert!(matches!(
            files.resolve("nested").await,
            Err(GatewayError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_name_without_basename_is_missing() {
        let (_dir, files) = fixture();
        for name in ["..", "/", "a/..", "1.jpg\0"] {
            assert!(matches!(
                files.resolve(name).await,
                Err(GatewayError::FileNotFound(n)) if n == name
            ));
        }
        assert!(ProtectedFiles::sanitize("..").is_err());
    }

    #[tokio::test]
    async fn test_attachment_headers() {
        let (_dir, files) = fixture();
        let resolved = files.resolve("1.jpg").await.unwrap();
        let response = files.attachment(&resolved).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"1.jpg\""
        );
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "10");
    }
}
