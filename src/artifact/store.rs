//! # Artifact Store
//!
//! Content-addressed artifact tree served by the static file server.
//!
//! Layout: `<root>/{imagerepository|mavenartifact}/<namespace>/<name>/<digest>.tar.gz`.
//! Publication always goes through a `.new` placeholder followed by an
//! atomic rename so concurrent readers never observe a partial file.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// The two source kinds sharing the artifact tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ImageRepository,
    MavenArtifact,
}

impl SourceKind {
    /// Directory segment under the artifact root
    pub fn dir_name(&self) -> &'static str {
        match self {
            SourceKind::ImageRepository => "imagerepository",
            SourceKind::MavenArtifact => "mavenartifact",
        }
    }
}

/// Root directory plus the host name used when constructing artifact URLs
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    host: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            host: host.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-record directory holding artifacts and sidecar files
    pub fn record_dir(&self, kind: SourceKind, namespace: &str, name: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(namespace).join(name)
    }

    /// Path of an artifact file relative to the root, as published in
    /// `status.artifact.path`
    pub fn http_path(kind: SourceKind, namespace: &str, name: &str, filename: &str) -> String {
        format!("{}/{}/{}/{}", kind.dir_name(), namespace, name, filename)
    }

    /// Public URL for an artifact path
    pub fn url(&self, http_path: &str) -> String {
        format!("http://{}/{}", self.host, http_path)
    }

    /// Filesystem location of an artifact path
    pub fn local_path(&self, http_path: &str) -> PathBuf {
        self.root.join(http_path)
    }

    /// Copy a finished artifact into the tree: write `<target>.new`, then
    /// rename to `<target>` so readers never see a partial file.
    pub async fn publish(&self, from: &Path, http_path: &str) -> Result<()> {
        let target = self.local_path(http_path);
        let placeholder = target.with_extension("gz.new");
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        tokio::fs::copy(from, &placeholder)
            .await
            .with_context(|| format!("unable to write {}", placeholder.display()))?;
        tokio::fs::rename(&placeholder, &target)
            .await
            .with_context(|| format!("unable to rename into {}", target.display()))?;
        Ok(())
    }

    /// Remove a record's artifact subdirectory. Called from the finalizer;
    /// a directory that never existed is a success.
    pub async fn cleanup(&self, kind: SourceKind, namespace: &str, name: &str) -> Result<()> {
        let dir = self.record_dir(kind, namespace, name);
        info!(dir = %dir.display(), "removing artifacts");
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("unable to remove {}", dir.display())),
        }
    }
}

/// Sidecar record persisted next to a Maven artifact: the source URL the
/// file came from and its remote checksum, enabling skip-on-unchanged
/// checks across reconciles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumCache {
    pub source: String,
    pub checksum: String,
}

impl ChecksumCache {
    /// Parse the `"<source>|<checksum>"` sidecar format. Content that does
    /// not match is treated as no cache.
    pub fn parse(contents: &str) -> Option<Self> {
        let (source, checksum) = contents.split_once('|')?;
        if source.is_empty() || checksum.is_empty() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            checksum: checksum.to_string(),
        })
    }

    /// Read a sidecar file; a missing file is no cache
    pub async fn read(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("unable to read {}", path.display())),
        }
    }

    /// Persist the sidecar file
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_string())
            .await
            .with_context(|| format!("unable to write {}", path.display()))
    }
}

impl fmt::Display for ChecksumCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.source, self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_content_addressed_layout() {
        let store = ArtifactStore::new("/var/artifacts", "localhost:8082");
        let path = ArtifactStore::http_path(
            SourceKind::ImageRepository,
            "default",
            "hello",
            "66201d.tar.gz",
        );
        assert_eq!(path, "imagerepository/default/hello/66201d.tar.gz");
        assert_eq!(
            store.url(&path),
            "http://localhost:8082/imagerepository/default/hello/66201d.tar.gz"
        );
        assert_eq!(
            store.local_path(&path),
            PathBuf::from("/var/artifacts/imagerepository/default/hello/66201d.tar.gz")
        );
        assert_eq!(
            store.record_dir(SourceKind::MavenArtifact, "ns", "demo"),
            PathBuf::from("/var/artifacts/mavenartifact/ns/demo")
        );
    }

    #[test]
    fn checksum_cache_round_trips() {
        let cache = ChecksumCache {
            source: "https://repo.example/m2/a/b/1.0/b-1.0.jar".into(),
            checksum: "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".into(),
        };
        let parsed = ChecksumCache::parse(&cache.to_string()).unwrap();
        assert_eq!(parsed, cache);
    }

    #[test]
    fn malformed_sidecar_is_no_cache() {
        assert!(ChecksumCache::parse("no separator").is_none());
        assert!(ChecksumCache::parse("|missing-source").is_none());
        assert!(ChecksumCache::parse("missing-checksum|").is_none());
    }

    #[tokio::test]
    async fn publish_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "localhost:8082");

        let scratch = dir.path().join("scratch.tar.gz");
        tokio::fs::write(&scratch, b"archive-bytes").await.unwrap();

        let http_path =
            ArtifactStore::http_path(SourceKind::MavenArtifact, "ns", "demo", "abc.tar.gz");
        store.publish(&scratch, &http_path).await.unwrap();

        let target = store.local_path(&http_path);
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"archive-bytes");
        assert!(!target.with_extension("gz.new").exists());
    }

    #[tokio::test]
    async fn cleanup_removes_the_record_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "localhost:8082");
        let record = store.record_dir(SourceKind::MavenArtifact, "ns", "demo");
        tokio::fs::create_dir_all(&record).await.unwrap();
        tokio::fs::write(record.join("a.tar.gz"), b"x").await.unwrap();

        store
            .cleanup(SourceKind::MavenArtifact, "ns", "demo")
            .await
            .unwrap();
        assert!(!record.exists());

        // second cleanup is a no-op
        store
            .cleanup(SourceKind::MavenArtifact, "ns", "demo")
            .await
            .unwrap();
    }
}
