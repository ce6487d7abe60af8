//! In-memory content store keyed by digest.
//!
//! Content fetched during a graph walk is kept for the lifetime of the store.
//! Nothing is evicted and no digest is verified: the caller vouches that the
//! bytes match the descriptor.

use async_trait::async_trait;
use bytes::Bytes;
use oci_distribution::manifest::OciDescriptor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::content::{Provider, ReaderAt};
use crate::handler::Handler;
use crate::remotes::Fetcher;
use crate::{Error, Result};

/// Thread-safe in-memory content store.
///
/// Clones share the same content, so a store can be handed to concurrent
/// fetch handlers and read back afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    content: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` under the descriptor's digest, replacing any previous
    /// content for that digest.
    pub fn set(&self, desc: &OciDescriptor, content: impl Into<Bytes>) {
        let content = content.into();
        trace!(digest = %desc.digest, len = content.len(), "Stored content");
        self.content.write().insert(desc.digest.clone(), content);
    }

    /// Get the content stored for the descriptor's digest.
    #[must_use]
    pub fn get(&self, desc: &OciDescriptor) -> Option<Bytes> {
        self.content.read().get(&desc.digest).cloned()
    }

    /// Check whether content is stored for the descriptor's digest.
    #[must_use]
    pub fn contains(&self, desc: &OciDescriptor) -> bool {
        self.content.read().contains_key(&desc.digest)
    }

    /// Number of stored digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }

    /// Open a reader over the content stored for the descriptor's digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the digest is not stored.
    pub fn reader(&self, desc: &OciDescriptor) -> Result<MemoryReader> {
        self.get(desc)
            .map(MemoryReader::new)
            .ok_or_else(|| Error::not_found(&desc.digest))
    }

    /// Handler that fetches each visited descriptor into this store.
    ///
    /// The handler never returns children; pair it with
    /// [`crate::children_handler`] and [`crate::dispatch`] for a recursive
    /// fetch.
    #[must_use]
    pub fn fetch_handler<F: Fetcher>(&self, fetcher: F) -> FetchHandler<F> {
        FetchHandler {
            store: self.clone(),
            fetcher,
        }
    }
}

#[async_trait]
impl Provider for MemoryStore {
    async fn reader_at(&self, desc: &OciDescriptor) -> Result<Box<dyn ReaderAt>> {
        Ok(Box::new(self.reader(desc)?))
    }
}

/// Positional reader over content held by a [`MemoryStore`].
///
/// Shares the stored buffer; dropping the reader leaves the store untouched.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    content: Bytes,
}

impl MemoryReader {
    fn new(content: Bytes) -> Self {
        Self { content }
    }
}

impl ReaderAt for MemoryReader {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        let Some(remaining) = self.content.get(offset..) else {
            return Ok(0);
        };

        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Traversal step that downloads a descriptor's content into a
/// [`MemoryStore`]. Created by [`MemoryStore::fetch_handler`].
#[derive(Debug)]
pub struct FetchHandler<F> {
    store: MemoryStore,
    fetcher: F,
}

#[async_trait]
impl<F: Fetcher> Handler for FetchHandler<F> {
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>> {
        debug!(
            digest = %desc.digest,
            media_type = %desc.media_type,
            size = desc.size,
            "fetch"
        );

        let mut stream = self
            .fetcher
            .fetch(desc)
            .await
            .map_err(|e| Error::fetch(&desc.digest, e))?;

        let mut content = Vec::new();
        stream
            .read_to_end(&mut content)
            .await
            .map_err(|e| Error::fetch(&desc.digest, e))?;
        drop(stream);

        self.store.set(desc, content);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remotes::FetchStream;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    fn descriptor(digest: &str) -> OciDescriptor {
        OciDescriptor {
            media_type: "application/octet-stream".to_string(),
            digest: digest.to_string(),
            size: 5,
            ..Default::default()
        }
    }

    // ==========================================================================
    // set / get tests
    // ==========================================================================

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");

        store.set(&desc, b"hello".to_vec());

        assert_eq!(store.get(&desc), Some(Bytes::from_static(b"hello")));
        assert!(store.contains(&desc));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get(&descriptor("sha256:missing")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_is_idempotent() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");

        store.set(&desc, "hello");
        store.set(&desc, "hello");

        assert_eq!(store.get(&desc).as_deref(), Some(&b"hello"[..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_keys_on_digest_only() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        let relabeled = OciDescriptor {
            media_type: "application/vnd.oci.image.layer.v1.tar".to_string(),
            ..desc.clone()
        };

        store.set(&desc, "hello");

        assert_eq!(store.get(&relabeled).as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_clones_share_content() {
        let store = MemoryStore::new();
        let shared = store.clone();

        shared.set(&descriptor("sha256:abc"), "hello");

        assert!(store.contains(&descriptor("sha256:abc")));
    }

    // ==========================================================================
    // reader tests
    // ==========================================================================

    #[tokio::test]
    async fn test_reader_at_missing_is_not_found() {
        let store = MemoryStore::new();

        let err = store
            .reader_at(&descriptor("sha256:missing"))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::NotFound { ref digest } if digest == "sha256:missing"));
    }

    #[tokio::test]
    async fn test_reader_at_size_and_offsets() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        store.set(&desc, "hello");

        let reader = store.reader_at(&desc).await.unwrap();
        assert_eq!(reader.size(), 5);

        for (offset, expected) in b"hello".iter().enumerate() {
            let mut buf = [0u8; 1];
            let n = reader.read_at(&mut buf, offset as u64).unwrap();
            assert_eq!(n, 1);
            assert_eq!(buf[0], *expected);
        }
    }

    #[test]
    fn test_reader_partial_read_at_tail() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        store.set(&desc, "hello");
        let reader = store.reader(&desc).unwrap();

        let mut buf = [0u8; 8];
        let n = reader.read_at(&mut buf, 3).unwrap();

        assert_eq!(n, 2);
        assert_eq!(&buf[..n], b"lo");
    }

    #[test]
    fn test_reader_end_of_data() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        store.set(&desc, "hello");
        let reader = store.reader(&desc).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(&mut buf, 5).unwrap(), 0);
        assert_eq!(reader.read_at(&mut buf, 100).unwrap(), 0);
        assert_eq!(reader.read_at(&mut buf, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_reader_keeps_content_from_creation() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        store.set(&desc, "hello");
        let reader = store.reader(&desc).unwrap();

        store.set(&desc, "replaced content");
        drop(store);

        let mut buf = [0u8; 16];
        let n = reader.read_at(&mut buf, 0).unwrap();
        assert_eq!(reader.size(), 5);
        assert_eq!(&buf[..n], b"hello");
    }

    // ==========================================================================
    // fetch handler tests
    // ==========================================================================

    enum Behavior {
        Content(&'static [u8]),
        FailOpen,
        FailRead,
    }

    struct TestFetcher {
        behavior: Behavior,
        dropped: Arc<AtomicBool>,
    }

    impl TestFetcher {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                dropped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    /// Yields some bytes, then errors; records when it is dropped.
    struct BrokenStream {
        sent: bool,
        dropped: Arc<AtomicBool>,
    }

    impl AsyncRead for BrokenStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            self.sent = true;
            buf.put_slice(b"hel");
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for BrokenStream {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Fetcher for TestFetcher {
        async fn fetch(
            &self,
            _desc: &OciDescriptor,
        ) -> std::result::Result<FetchStream, RemoteError> {
            match self.behavior {
                Behavior::Content(content) => Ok(Box::new(content)),
                Behavior::FailOpen => Err("401 unauthorized".into()),
                Behavior::FailRead => Ok(Box::new(BrokenStream {
                    sent: false,
                    dropped: Arc::clone(&self.dropped),
                })),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_handler_stores_content() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        let handler = store.fetch_handler(TestFetcher::new(Behavior::Content(b"hello")));

        let children = handler.handle(&desc).await.unwrap();

        assert!(children.is_empty());
        assert_eq!(store.get(&desc).as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_fetch_handler_open_failure_stores_nothing() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        let handler = store.fetch_handler(TestFetcher::new(Behavior::FailOpen));

        let err = handler.handle(&desc).await.unwrap_err();

        match err {
            Error::Fetch { digest, source } => {
                assert_eq!(digest, "sha256:abc");
                assert_eq!(source.to_string(), "401 unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.get(&desc).is_none());
    }

    #[tokio::test]
    async fn test_fetch_handler_read_failure_releases_stream() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc");
        let fetcher = TestFetcher::new(Behavior::FailRead);
        let dropped = Arc::clone(&fetcher.dropped);
        let handler = store.fetch_handler(fetcher);

        let err = handler.handle(&desc).await.unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!store.contains(&desc));
    }

    #[tokio::test]
    async fn test_fetch_handler_keeps_earlier_content_on_failure() {
        let store = MemoryStore::new();
        let first = descriptor("sha256:first");
        store
            .fetch_handler(TestFetcher::new(Behavior::Content(b"first")))
            .handle(&first)
            .await
            .unwrap();

        let result = store
            .fetch_handler(TestFetcher::new(Behavior::FailOpen))
            .handle(&descriptor("sha256:second"))
            .await;

        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first).as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn test_concurrent_set_and_get() {
        let store = MemoryStore::new();
        let mut tasks = Vec::new();

        for i in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let desc = descriptor(&format!("sha256:{i:02}"));
                store.set(&desc, format!("content-{i}"));
                store.get(&desc)
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let content = task.await.unwrap().unwrap();
            assert_eq!(content, Bytes::from(format!("content-{i}")));
        }
        assert_eq!(store.len(), 32);
    }
}
