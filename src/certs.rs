//! Persists TLS certificate material found in container metadata
//!
//! Certificates arrive as environment-variable payloads with newlines
//! escaped as `\n`. They are written to `<certs_dir>/<hostname>.crt`
//! before the model referencing them is rendered, overwriting any prior
//! content for the same hostname.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes certificate files keyed by hostname under a fixed directory
#[derive(Debug, Clone)]
pub struct CertStore {
    dir: PathBuf,
}

impl CertStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the certificate directory if it does not exist yet
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create certs directory {}", self.dir.display()))
    }

    /// Deterministic on-disk path for a hostname's certificate
    pub fn path_for(&self, hostname: &str) -> PathBuf {
        self.dir.join(format!("{}.crt", hostname))
    }

    /// Unescape and write certificate material for `hostname`, overwriting
    /// any previous file. The hostname must be a bare name, not a path.
    pub fn write(&self, hostname: &str, material: &str) -> Result<PathBuf> {
        if hostname.contains('/') || hostname.contains("..") {
            bail!("refusing certificate write for invalid hostname '{}'", hostname);
        }

        let path = self.path_for(hostname);
        let pem = unescape_newlines(material);
        fs::write(&path, pem)
            .with_context(|| format!("Failed to write certificate {}", path.display()))?;

        debug!(hostname, path = %path.display(), "Wrote certificate");
        Ok(path)
    }
}

fn unescape_newlines(material: &str) -> String {
    material.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_unescapes_newlines() {
        let dir = TempDir::new().unwrap();
        let store = CertStore::new(dir.path());

        let path = store
            .write("api.example.com", "-----BEGIN CERT-----\\nabc\\n-----END CERT-----")
            .unwrap();

        assert_eq!(path, dir.path().join("api.example.com.crt"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "-----BEGIN CERT-----\nabc\n-----END CERT-----");
    }

    #[test]
    fn test_write_overwrites_prior_content() {
        let dir = TempDir::new().unwrap();
        let store = CertStore::new(dir.path());

        store.write("api.example.com", "old").unwrap();
        store.write("api.example.com", "new").unwrap();

        let content = std::fs::read_to_string(store.path_for("api.example.com")).unwrap();
        assert_eq!(content, "new");
    }

    #[test]
    fn test_write_rejects_path_like_hostnames() {
        let dir = TempDir::new().unwrap();
        let store = CertStore::new(dir.path());

        assert!(store.write("../etc/passwd", "x").is_err());
        assert!(store.write("a/b", "x").is_err());
    }

    #[test]
    fn test_write_fails_when_dir_missing() {
        let dir = TempDir::new().unwrap();
        let store = CertStore::new(dir.path().join("absent"));

        assert!(store.write("api.example.com", "x").is_err());

        store.ensure_dir().unwrap();
        assert!(store.write("api.example.com", "x").is_ok());
    }
}
