//! Discovery of artifacts referencing a resolved reference.

use oci_distribution::manifest::OciDescriptor;
use tracing::debug;

use crate::remotes::{DiscoveredArtifact, Resolver};
use crate::{Error, Result};

/// Discover the artifacts of `artifact_type` that reference `reference`.
///
/// Resolves the reference, asks the resolver for a discoverer scoped to it
/// and queries the discoverer with the resolved descriptor. Artifacts are
/// returned in the order the discoverer produced them.
///
/// # Errors
///
/// - [`Error::Resolution`] if the reference cannot be resolved; the
///   discoverer is not requested.
/// - [`Error::DiscovererUnavailable`] if the resolver has no discoverer.
/// - [`Error::Discovery`] if the discovery query fails.
pub async fn discover<R>(
    resolver: &R,
    reference: &str,
    artifact_type: &str,
) -> Result<(OciDescriptor, Vec<DiscoveredArtifact>)>
where
    R: Resolver + ?Sized,
{
    let (_, desc) = resolver
        .resolve(reference)
        .await
        .map_err(|e| Error::resolution(reference, e))?;
    debug!(%reference, digest = %desc.digest, "Resolved reference");

    let discoverer = resolver
        .discoverer(reference)
        .await
        .map_err(|e| Error::discoverer_unavailable(reference, e))?;

    let artifacts = discoverer
        .discover(&desc, artifact_type)
        .await
        .map_err(|e| Error::discovery(&desc.digest, artifact_type, e))?;
    debug!(
        %reference,
        artifact_type,
        count = artifacts.len(),
        "Discovered artifacts"
    );

    Ok((desc, artifacts))
}
