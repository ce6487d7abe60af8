//! Registry client implementing the resolver, discoverer and fetcher
//! capabilities.
//!
//! Uses `oci-distribution` for registry operations. Referrers are looked up
//! through the OCI referrers tag schema: an image index tagged
//! `<alg>-<hex>` in the subject's repository.

use async_trait::async_trait;
use oci_distribution::client::ClientConfig;
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::config::RegistryConfig;
use crate::error::RemoteError;
use crate::media_type;
use crate::remotes::{DiscoveredArtifact, Discoverer, FetchStream, Fetcher, Resolver};
use crate::{Error, Result};

/// Registry client for resolving references, fetching content and
/// discovering referrers.
///
/// Cheap to clone; clones share the underlying HTTP client.
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    config: RegistryConfig,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    /// Create a client configured from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::from_env())
    }

    /// Create a client with an explicit configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        let client = Client::new(ClientConfig {
            protocol: config.protocol.to_client_protocol(),
            ..Default::default()
        });
        Self {
            inner: Arc::new(Inner { client, config }),
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Fetcher for content in the repository of `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] if the reference cannot be parsed.
    pub fn fetcher(&self, reference: &str) -> Result<RegistryFetcher> {
        Ok(RegistryFetcher {
            inner: Arc::clone(&self.inner),
            reference: parse_reference(reference)?,
        })
    }
}

impl Inner {
    /// Get authentication for a registry.
    ///
    /// Configured credentials win. For `ghcr.io`, `GITHUB_TOKEN` or
    /// `GH_TOKEN` is used when set; everything else is anonymous.
    fn get_auth(&self, reference: &Reference) -> RegistryAuth {
        if let Some(credentials) = &self.config.credentials {
            return RegistryAuth::Basic(
                credentials.username.clone(),
                credentials.password.clone(),
            );
        }

        if reference.registry() == "ghcr.io" {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                return RegistryAuth::Basic(String::new(), token);
            }
            if let Ok(token) = std::env::var("GH_TOKEN") {
                return RegistryAuth::Basic(String::new(), token);
            }
        }

        RegistryAuth::Anonymous
    }

    async fn pull_manifest(
        &self,
        reference: &Reference,
        accept: &[&str],
    ) -> std::result::Result<(Vec<u8>, String), OciDistributionError> {
        let auth = self.get_auth(reference);
        self.client
            .pull_manifest_raw(reference, &auth, accept)
            .await
    }
}

#[async_trait]
impl Resolver for RegistryClient {
    async fn resolve(
        &self,
        reference: &str,
    ) -> std::result::Result<(String, OciDescriptor), RemoteError> {
        let parsed = parse_reference(reference)?;
        info!(%reference, "Resolving reference");

        let (raw, digest) = self
            .inner
            .pull_manifest(&parsed, media_type::RESOLVE_ACCEPT)
            .await
            .map_err(|e| Error::registry(reference, e.to_string()))?;

        let desc = OciDescriptor {
            media_type: manifest_media_type(&raw),
            digest,
            size: i64::try_from(raw.len()).unwrap_or(i64::MAX),
            ..Default::default()
        };
        debug!(
            %reference,
            digest = %desc.digest,
            media_type = %desc.media_type,
            size = desc.size,
            "Resolved reference"
        );

        Ok((parsed.whole(), desc))
    }

    async fn discoverer(
        &self,
        reference: &str,
    ) -> std::result::Result<Box<dyn Discoverer>, RemoteError> {
        Ok(Box::new(RegistryDiscoverer {
            inner: Arc::clone(&self.inner),
            reference: parse_reference(reference)?,
        }))
    }
}

/// Discovers referrers within one repository.
pub struct RegistryDiscoverer {
    inner: Arc<Inner>,
    reference: Reference,
}

#[async_trait]
impl Discoverer for RegistryDiscoverer {
    async fn discover(
        &self,
        desc: &OciDescriptor,
        artifact_type: &str,
    ) -> std::result::Result<Vec<DiscoveredArtifact>, RemoteError> {
        let tag = referrers_tag(&desc.digest);
        let index = Reference::with_tag(
            self.reference.registry().to_string(),
            self.reference.repository().to_string(),
            tag,
        );
        debug!(subject = %desc.digest, index = %index.whole(), "Looking up referrers");

        match self.inner.pull_manifest(&index, &[media_type::OCI_INDEX]).await {
            Ok((raw, _)) => Ok(parse_referrers(&raw, &index.whole(), artifact_type)?),
            Err(e) if is_manifest_unknown(&e) => {
                trace!(subject = %desc.digest, "No referrers index");
                Ok(Vec::new())
            }
            Err(e) => Err(Error::registry(index.whole(), e.to_string()).into()),
        }
    }
}

/// Fetches manifests and blobs from one repository.
pub struct RegistryFetcher {
    inner: Arc<Inner>,
    reference: Reference,
}

#[async_trait]
impl Fetcher for RegistryFetcher {
    async fn fetch(&self, desc: &OciDescriptor) -> std::result::Result<FetchStream, RemoteError> {
        debug!(digest = %desc.digest, media_type = %desc.media_type, "Fetching content");

        let content = if media_type::is_manifest(&desc.media_type)
            || media_type::is_index(&desc.media_type)
        {
            let by_digest = Reference::with_digest(
                self.reference.registry().to_string(),
                self.reference.repository().to_string(),
                desc.digest.clone(),
            );
            let (raw, _) = self
                .inner
                .pull_manifest(&by_digest, &[desc.media_type.as_str()])
                .await
                .map_err(|e| Error::registry(by_digest.whole(), e.to_string()))?;
            raw
        } else {
            // pull_blob only applies credentials the client already holds.
            let auth = self.inner.get_auth(&self.reference);
            self.inner
                .client
                .auth(&self.reference, &auth, RegistryOperation::Pull)
                .await
                .map_err(|e| Error::registry(self.reference.whole(), e.to_string()))?;

            let mut blob = Vec::new();
            self.inner
                .client
                .pull_blob(&self.reference, desc, &mut blob)
                .await
                .map_err(|e| Error::registry(self.reference.whole(), e.to_string()))?;
            blob
        };

        Ok(Box::new(Cursor::new(content)))
    }
}

/// Parse a reference string.
fn parse_reference(reference: &str) -> Result<Reference> {
    reference.parse().map_err(|e: oci_distribution::ParseError| {
        Error::invalid_reference(reference, e.to_string())
    })
}

/// Tag under which the referrers index of `digest` is stored.
///
/// `sha256:abc` becomes `sha256-abc`; the algorithm is cut to 32 characters
/// and the encoded part to 64 to stay within the tag length limit.
fn referrers_tag(digest: &str) -> String {
    let (algorithm, encoded) = digest.split_once(':').unwrap_or(("sha256", digest));
    let algorithm: String = algorithm.chars().take(32).collect();
    let encoded: String = encoded.chars().take(64).collect();
    format!("{algorithm}-{encoded}")
}

/// Whether the registry reported the requested manifest as unknown.
fn is_manifest_unknown(err: &OciDistributionError) -> bool {
    match err {
        OciDistributionError::RegistryError { envelope, .. } => envelope
            .errors
            .iter()
            .any(|e| e.code == OciErrorCode::ManifestUnknown),
        _ => false,
    }
}

#[derive(Deserialize)]
struct ManifestShape {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    manifests: Option<serde_json::Value>,
}

/// Media type of a raw manifest, falling back to its shape when the
/// `mediaType` field is absent.
fn manifest_media_type(raw: &[u8]) -> String {
    match serde_json::from_slice::<ManifestShape>(raw) {
        Ok(ManifestShape {
            media_type: Some(media_type),
            ..
        }) => media_type,
        Ok(ManifestShape {
            manifests: Some(_), ..
        }) => media_type::OCI_INDEX.to_string(),
        _ => media_type::OCI_MANIFEST.to_string(),
    }
}

#[derive(Deserialize)]
struct ReferrersIndex {
    #[serde(default)]
    manifests: Vec<DiscoveredArtifact>,
}

/// Decode a referrers index, keeping entries of `artifact_type` in index
/// order. An empty filter keeps everything.
fn parse_referrers(
    raw: &[u8],
    index: &str,
    artifact_type: &str,
) -> Result<Vec<DiscoveredArtifact>> {
    let parsed: ReferrersIndex =
        serde_json::from_slice(raw).map_err(|e| Error::manifest(index, e))?;

    Ok(parsed
        .manifests
        .into_iter()
        .filter(|a| artifact_type.is_empty() || a.artifact_type.as_deref() == Some(artifact_type))
        .collect())
}
