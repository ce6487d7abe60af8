//! Registry capabilities consumed by discovery and fetching.
//!
//! Any registry client can back these traits; [`crate::RegistryClient`] is the
//! `oci-distribution` implementation.

use async_trait::async_trait;
use oci_distribution::manifest::OciDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::error::RemoteError;

/// Readable content stream returned by a [`Fetcher`]. Dropping it closes it.
pub type FetchStream = Box<dyn AsyncRead + Send + Unpin>;

/// An artifact manifest that references another descriptor.
///
/// Two artifacts are equal when their media type, digest, size and artifact
/// type match; annotations and URLs are not compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredArtifact {
    /// Descriptor of the artifact manifest.
    #[serde(flatten)]
    pub descriptor: OciDescriptor,
    /// Artifact type of the manifest, when the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl PartialEq for DiscoveredArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.media_type == other.descriptor.media_type
            && self.descriptor.digest == other.descriptor.digest
            && self.descriptor.size == other.descriptor.size
            && self.artifact_type == other.artifact_type
    }
}

/// Resolves references and hands out discoverers.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a reference to its name and descriptor.
    async fn resolve(&self, reference: &str) -> Result<(String, OciDescriptor), RemoteError>;

    /// Obtain a discoverer scoped to the reference.
    async fn discoverer(&self, reference: &str) -> Result<Box<dyn Discoverer>, RemoteError>;
}

/// Finds artifacts referencing a descriptor.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// List the artifacts of `artifact_type` that reference `desc`.
    async fn discover(
        &self,
        desc: &OciDescriptor,
        artifact_type: &str,
    ) -> Result<Vec<DiscoveredArtifact>, RemoteError>;
}

/// Opens content streams for descriptors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Open a stream over the content of `desc`.
    async fn fetch(&self, desc: &OciDescriptor) -> Result<FetchStream, RemoteError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, desc: &OciDescriptor) -> Result<FetchStream, RemoteError> {
        (**self).fetch(desc).await
    }
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Box<T> {
    async fn fetch(&self, desc: &OciDescriptor) -> Result<FetchStream, RemoteError> {
        (**self).fetch(desc).await
    }
}
