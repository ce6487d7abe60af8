//! Error types for discovery and content store operations.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for discovery and content store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error reported by a registry capability (resolver, discoverer, fetcher).
///
/// Kept opaque so any registry client can sit behind the capability traits.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during discovery and content operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Reference could not be resolved to a descriptor.
    #[error("Failed to resolve '{reference}'")]
    #[diagnostic(code(oras::resolve))]
    Resolution {
        /// The reference being resolved.
        reference: String,
        /// The resolver's error.
        #[source]
        source: RemoteError,
    },

    /// Resolver could not supply a discoverer for the reference.
    #[error("No discoverer available for '{reference}'")]
    #[diagnostic(code(oras::discoverer))]
    DiscovererUnavailable {
        /// The reference a discoverer was requested for.
        reference: String,
        /// The resolver's error.
        #[source]
        source: RemoteError,
    },

    /// The discovery query failed.
    #[error("Failed to discover '{artifact_type}' artifacts referencing {digest}")]
    #[diagnostic(code(oras::discover))]
    Discovery {
        /// Digest of the subject descriptor.
        digest: String,
        /// The artifact type filter.
        artifact_type: String,
        /// The discoverer's error.
        #[source]
        source: RemoteError,
    },

    /// Opening or draining a fetch stream failed.
    #[error("Failed to fetch {digest}")]
    #[diagnostic(code(oras::fetch))]
    Fetch {
        /// Digest of the descriptor being fetched.
        digest: String,
        /// The fetcher or stream error.
        #[source]
        source: RemoteError,
    },

    /// Digest absent from the store.
    #[error("Content not found: {digest}")]
    #[diagnostic(
        code(oras::not_found),
        help("Fetch the content into the store before reading it")
    )]
    NotFound {
        /// The digest that was looked up.
        digest: String,
    },

    /// Failed to parse a reference.
    #[error("Invalid reference '{0}': {1}")]
    #[diagnostic(code(oras::reference))]
    InvalidReference(String, String),

    /// Registry request failed.
    #[error("Registry error for '{reference}': {message}")]
    #[diagnostic(code(oras::registry))]
    Registry {
        /// The reference the request was made for.
        reference: String,
        /// Error message from the registry client.
        message: String,
    },

    /// Manifest or index content could not be decoded.
    #[error("Failed to decode manifest {digest}")]
    #[diagnostic(code(oras::manifest))]
    Manifest {
        /// Digest of the manifest.
        digest: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(oras::io))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a resolution error.
    #[must_use]
    pub fn resolution(reference: impl Into<String>, source: impl Into<RemoteError>) -> Self {
        Self::Resolution {
            reference: reference.into(),
            source: source.into(),
        }
    }

    /// Create a discoverer unavailable error.
    #[must_use]
    pub fn discoverer_unavailable(
        reference: impl Into<String>,
        source: impl Into<RemoteError>,
    ) -> Self {
        Self::DiscovererUnavailable {
            reference: reference.into(),
            source: source.into(),
        }
    }

    /// Create a discovery error.
    #[must_use]
    pub fn discovery(
        digest: impl Into<String>,
        artifact_type: impl Into<String>,
        source: impl Into<RemoteError>,
    ) -> Self {
        Self::Discovery {
            digest: digest.into(),
            artifact_type: artifact_type.into(),
            source: source.into(),
        }
    }

    /// Create a fetch error.
    #[must_use]
    pub fn fetch(digest: impl Into<String>, source: impl Into<RemoteError>) -> Self {
        Self::Fetch {
            digest: digest.into(),
            source: source.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(digest: impl Into<String>) -> Self {
        Self::NotFound {
            digest: digest.into(),
        }
    }

    /// Create an invalid reference error.
    #[must_use]
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference(reference.into(), message.into())
    }

    /// Create a registry error.
    #[must_use]
    pub fn registry(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registry {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a manifest decoding error.
    #[must_use]
    pub fn manifest(digest: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Manifest {
            digest: digest.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_resolution_error_keeps_source() {
        let err = Error::resolution("repo:tag", "manifest unknown");
        assert!(err.to_string().contains("repo:tag"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "manifest unknown");
    }

    #[test]
    fn test_discovery_error_message() {
        let err = Error::discovery("sha256:abc", "application/vnd.example+type", "boom");
        let msg = err.to_string();
        assert!(msg.contains("sha256:abc"));
        assert!(msg.contains("application/vnd.example+type"));
    }

    #[test]
    fn test_fetch_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream cut");
        let err = Error::fetch("sha256:abc", io);
        assert!(matches!(err, Error::Fetch { ref digest, .. } if digest == "sha256:abc"));
        assert_eq!(err.source().unwrap().to_string(), "stream cut");
    }

    #[test]
    fn test_not_found_error() {
        let err = Error::not_found("sha256:missing");
        assert_eq!(err.to_string(), "Content not found: sha256:missing");
    }

    #[test]
    fn test_invalid_reference_error() {
        let err = Error::invalid_reference("bad ref", "parse error");
        let msg = err.to_string();
        assert!(msg.contains("bad ref"));
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn test_error_is_a_remote_error() {
        let remote: RemoteError = Error::registry("repo:tag", "unauthorized").into();
        assert!(remote.to_string().contains("unauthorized"));
    }
}
