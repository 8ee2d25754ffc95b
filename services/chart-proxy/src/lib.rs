//! # Helm chart OCI proxy
//!
//! A pull-through cache which serves Helm charts over the
//! [OCI Distribution Specification](https://github.com/opencontainers/distribution-spec).
//!
//! Manifests are held in memory and populated lazily: the first request for a
//! chart asks a [`ChartSource`] to fetch and prepare it, and later requests are
//! answered from the cache until the entry expires.
//!
//! ## Endpoints
//!
//! - `GET /v2/`: version probe
//! - `GET, HEAD /v2/{repository}/manifests/{reference}`
//! - `GET /v2/{repository}/tags/list?last=&n=`
//! - `GET /v2/_catalog?n=`: repositories in the cache
//! - `GET /v2/{parent}/_catalog?n=`: charts in the index federated under `parent`
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use chart_proxy::{Manifest, RegistryBuilder, StaticSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = StaticSource::new().with_chart(
//!     "charts/app",
//!     "1.0.0",
//!     Manifest::new("application/vnd.oci.image.manifest.v1+json", "{}"),
//! );
//!
//! let app = RegistryBuilder::new(source)
//!     .cache_ttl(Duration::from_secs(15 * 60))
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod catalog;
mod error;
mod manifest;
mod reference;
pub mod route;
mod seed;
mod source;
mod store;
mod tags;

pub use api::{RegistryBuilder, router};
pub use catalog::{Catalog, DEFAULT_CATALOG_LIMIT};
pub use error::{RegistryError, RegistryResult};
pub use manifest::{Manifest, ManifestResponse, OCI_MANIFEST};
pub use reference::{Digest, Reference};
pub use seed::{Seed, SeedChart, StaticSource};
pub use source::{ChartIndex, ChartSource, Prepared, SourceError};
pub use store::Manifests;
pub use tags::TagList;
pub use tokio_util::sync::CancellationToken;
