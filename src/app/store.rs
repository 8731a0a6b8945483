//! Cache store contract and the directory-backed implementation
//!
//! The store supplies the optional second destination of a download: a
//! writable sink the worker tees every chunk into. Writes land in a
//! temporary file; only a successful, complete transfer is committed to the
//! final path with an atomic rename, so interrupted downloads can never
//! leave a plausible-looking partial file in the cache. Eviction and
//! retention are someone else's problem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::app::transfer::CacheSink;
use crate::constants::store;
use crate::errors::{StoreError, StoreResult};

/// Supplier of cache sinks keyed by product id
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a writable temp sink for the product.
    ///
    /// Repeated calls for the same product reopen the same temp entry in
    /// append mode, so a resumed attempt keeps writing where the last one
    /// stopped.
    async fn open_sink(&self, product_id: &str) -> StoreResult<CacheSink>;

    /// Atomically promote the temp entry to the final cache path.
    async fn commit(&self, product_id: &str) -> StoreResult<()>;

    /// Remove the temp entry, if any. Safe to call when nothing is pending.
    async fn discard(&self, product_id: &str) -> StoreResult<()>;
}

/// Cache store keeping one file per product under a root directory
#[derive(Debug, Clone)]
pub struct DirCacheStore {
    root: PathBuf,
}

impl DirCacheStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|_| StoreError::DirectoryNotAccessible { path: root.clone() })?;
        Ok(Self { root })
    }

    /// Final cache path for a product
    pub fn entry_path(&self, product_id: &str) -> PathBuf {
        self.root.join(sanitize_file_name(product_id))
    }

    fn temp_path(&self, product_id: &str) -> PathBuf {
        let mut name = sanitize_file_name(product_id);
        name.push_str(store::TEMP_FILE_SUFFIX);
        self.root.join(name)
    }

    /// The root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStore for DirCacheStore {
    async fn open_sink(&self, product_id: &str) -> StoreResult<CacheSink> {
        let path = self.temp_path(product_id);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("Opened cache sink: {}", path.display());
        Ok(Box::new(file))
    }

    async fn commit(&self, product_id: &str) -> StoreResult<()> {
        let temp_path = self.temp_path(product_id);
        let final_path = self.entry_path(product_id);

        if !temp_path.exists() {
            return Err(StoreError::NothingToCommit {
                product_id: product_id.to_string(),
            });
        }

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|_| StoreError::CommitFailed {
                temp_path,
                final_path: final_path.clone(),
            })?;
        debug!("Committed cache entry: {}", final_path.display());
        Ok(())
    }

    async fn discard(&self, product_id: &str) -> StoreResult<()> {
        let temp_path = self.temp_path(product_id);
        match tokio::fs::remove_file(&temp_path).await {
            Ok(()) => {
                debug!("Discarded cache temp entry: {}", temp_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flatten a product id into a safe file name
fn sanitize_file_name(product_id: &str) -> String {
    product_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    /// Test the write-commit round trip
    ///
    /// Until commit, the final path must not exist; after commit, it must
    /// hold exactly the written bytes and the temp entry must be gone.
    #[tokio::test]
    async fn test_commit_is_atomic() {
        let dir = TempDir::new().unwrap();
        let cache = DirCacheStore::new(dir.path()).await.unwrap();

        let mut sink = cache.open_sink("product-1").await.unwrap();
        sink.write_all(b"cached bytes").await.unwrap();
        sink.shutdown().await.unwrap();

        let final_path = cache.entry_path("product-1");
        assert!(!final_path.exists());

        cache.commit("product-1").await.unwrap();
        assert_eq!(std::fs::read(&final_path).unwrap(), b"cached bytes");
        assert!(!cache.temp_path("product-1").exists());
    }

    /// Test that resumed sinks append rather than truncate
    #[tokio::test]
    async fn test_reopened_sink_appends() {
        let dir = TempDir::new().unwrap();
        let cache = DirCacheStore::new(dir.path()).await.unwrap();

        let mut sink = cache.open_sink("p").await.unwrap();
        sink.write_all(b"first").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        let mut sink = cache.open_sink("p").await.unwrap();
        sink.write_all(b" second").await.unwrap();
        sink.shutdown().await.unwrap();

        cache.commit("p").await.unwrap();
        assert_eq!(
            std::fs::read(cache.entry_path("p")).unwrap(),
            b"first second"
        );
    }

    /// Test discard removes pending entries and tolerates absent ones
    #[tokio::test]
    async fn test_discard() {
        let dir = TempDir::new().unwrap();
        let cache = DirCacheStore::new(dir.path()).await.unwrap();

        let mut sink = cache.open_sink("p").await.unwrap();
        sink.write_all(b"junk").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        cache.discard("p").await.unwrap();
        assert!(!cache.temp_path("p").exists());

        // Nothing pending: still fine
        cache.discard("p").await.unwrap();
        assert!(matches!(
            cache.commit("p").await,
            Err(StoreError::NothingToCommit { .. })
        ));
    }

    /// Test product ids with path separators cannot escape the root
    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_file_name("data-v1.2_final"), "data-v1.2_final");
    }
}
