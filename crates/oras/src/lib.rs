//! OCI artifact discovery and in-memory content storage.
//!
//! This crate provides:
//! - [`discover`]: resolve a reference and list the artifacts referencing it
//! - [`MemoryStore`]: a digest-keyed in-memory store with positional readers
//!   and a fetch handler for content graph walks
//! - [`dispatch`], [`handlers`] and [`children_handler`] to drive those walks
//! - [`RegistryClient`]: the resolver, discoverer and fetcher capabilities
//!   backed by `oci-distribution`
//!
//! # Example
//!
//! ```ignore
//! use oras::{Handler, MemoryStore, RegistryClient, Resolver};
//! use oras::{children_handler, discover, dispatch, handlers};
//!
//! let client = RegistryClient::new();
//! let (subject, signatures) =
//!     discover(&client, "ghcr.io/org/app:v1", "application/vnd.example.signature").await?;
//!
//! // Pull every signature manifest and its blobs into memory
//! let store = MemoryStore::new();
//! let steps: Vec<Box<dyn Handler>> = vec![
//!     Box::new(store.fetch_handler(client.fetcher("ghcr.io/org/app:v1")?)),
//!     Box::new(children_handler(store.clone())),
//! ];
//! let roots = signatures.into_iter().map(|a| a.descriptor).collect();
//! dispatch(&handlers(steps), roots).await?;
//! ```

#![warn(missing_docs)]

mod config;
mod content;
mod discover;
mod error;
mod handler;
pub mod media_type;
mod registry;
mod remotes;
mod store;

pub use config::{Credentials, RegistryConfig, RegistryProtocol};
pub use content::{Provider, ReaderAt, read_blob};
pub use discover::discover;
pub use error::{Error, RemoteError, Result};
pub use handler::{
    ChildrenHandler, Handler, HandlerFn, Handlers, children_handler, dispatch, handlers,
};
pub use registry::{RegistryClient, RegistryDiscoverer, RegistryFetcher};
pub use remotes::{DiscoveredArtifact, Discoverer, FetchStream, Fetcher, Resolver};
pub use store::{FetchHandler, MemoryReader, MemoryStore};

/// Descriptor type shared with `oci-distribution`.
pub use oci_distribution::manifest::OciDescriptor;
