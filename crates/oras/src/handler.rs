//! Content graph traversal.
//!
//! A [`Handler`] visits one descriptor and returns its children. [`dispatch`]
//! walks the graph by feeding children back into the handler, running
//! siblings concurrently. Handlers compose with [`handlers`], so a fetch step
//! and a child-decoding step can be combined into a recursive pull:
//!
//! ```ignore
//! use oras::{Handler, MemoryStore, children_handler, dispatch, handlers};
//!
//! let store = MemoryStore::new();
//! let steps: Vec<Box<dyn Handler>> = vec![
//!     Box::new(store.fetch_handler(fetcher)),
//!     Box::new(children_handler(store.clone())),
//! ];
//! dispatch(&handlers(steps), vec![root]).await?;
//! ```

use async_trait::async_trait;
use futures::future::{BoxFuture, try_join_all};
use oci_distribution::manifest::OciDescriptor;
use serde::Deserialize;
use std::future::Future;
use tracing::trace;

use crate::content::{Provider, read_blob};
use crate::media_type;
use crate::{Error, Result};

/// A single step of a content graph walk.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Visit `desc` and return the descriptors to visit next.
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>> {
        (**self).handle(desc).await
    }
}

/// Adapts an async function into a [`Handler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(OciDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<OciDescriptor>>> + Send + 'static,
{
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>> {
        (self.0)(desc.clone()).await
    }
}

/// Runs handlers in order, concatenating their children.
pub struct Handlers(Vec<Box<dyn Handler>>);

/// Combine handlers into one that runs each in order for every descriptor.
///
/// Stops at the first error.
#[must_use]
pub fn handlers(handlers: Vec<Box<dyn Handler>>) -> Handlers {
    Handlers(handlers)
}

#[async_trait]
impl Handler for Handlers {
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>> {
        let mut children = Vec::new();
        for handler in &self.0 {
            children.extend(handler.handle(desc).await?);
        }
        Ok(children)
    }
}

/// Walk the content graph rooted at `descs`.
///
/// Each descriptor is handed to `handler`; the children it returns are
/// dispatched in turn. Siblings are handled concurrently and the first error
/// aborts the walk.
///
/// # Errors
///
/// Returns the first error produced by the handler.
pub async fn dispatch<H>(handler: &H, descs: Vec<OciDescriptor>) -> Result<()>
where
    H: Handler + ?Sized,
{
    dispatch_all(handler, descs).await
}

fn dispatch_all<'a, H>(handler: &'a H, descs: Vec<OciDescriptor>) -> BoxFuture<'a, Result<()>>
where
    H: Handler + ?Sized,
{
    Box::pin(async move {
        try_join_all(descs.into_iter().map(move |desc| async move {
            let children = handler.handle(&desc).await?;
            if !children.is_empty() {
                trace!(digest = %desc.digest, count = children.len(), "Dispatching children");
                dispatch_all(handler, children).await?;
            }
            Ok::<_, Error>(())
        }))
        .await?;
        Ok(())
    })
}

/// Decodes the children of manifests and indexes read from a provider.
///
/// Created by [`children_handler`].
pub struct ChildrenHandler<P> {
    provider: P,
}

/// Handler returning the children of manifests and indexes.
///
/// Image manifests yield their config followed by their layers, indexes and
/// manifest lists yield their manifests, and every other media type has no
/// children. The content is read from `provider`, so an earlier handler must
/// have stored it there.
#[must_use]
pub fn children_handler<P: Provider>(provider: P) -> ChildrenHandler<P> {
    ChildrenHandler { provider }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestChildren {
    config: Option<OciDescriptor>,
    layers: Vec<OciDescriptor>,
    manifests: Vec<OciDescriptor>,
}

#[async_trait]
impl<P: Provider> Handler for ChildrenHandler<P> {
    async fn handle(&self, desc: &OciDescriptor) -> Result<Vec<OciDescriptor>> {
        let media_type = desc.media_type.as_str();
        if !media_type::is_manifest(media_type) && !media_type::is_index(media_type) {
            return Ok(Vec::new());
        }

        let content = read_blob(&self.provider, desc).await?;
        let parsed: ManifestChildren =
            serde_json::from_slice(&content).map_err(|e| Error::manifest(&desc.digest, e))?;

        if media_type::is_index(media_type) {
            return Ok(parsed.manifests);
        }

        let mut children = Vec::with_capacity(parsed.layers.len() + 1);
        children.extend(parsed.config);
        children.extend(parsed.layers);
        Ok(children)
    }
}
