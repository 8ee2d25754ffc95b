//! The upstream chart source consumed by the manifest cache

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::manifest::Manifest;
use crate::reference::Reference;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Entries produced by preparing a chart, inserted into the cache together.
pub type Prepared = Vec<(Reference, Manifest)>;

/// Errors from a chart source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Upstream has no such chart or version
    #[error("chart not found upstream: {0}")]
    NotFound(String),

    /// Fetching or transforming the chart failed
    #[error("upstream error: {0}")]
    Upstream(#[source] BoxError),

    /// Every caller gave up before the chart was prepared
    #[error("chart preparation cancelled")]
    Cancelled,
}

impl SourceError {
    /// Wrap an arbitrary upstream failure
    pub fn upstream<E: Into<BoxError>>(error: E) -> Self {
        SourceError::Upstream(error.into())
    }
}

/// Charts visible under a federated parent repository.
///
/// Maps each chart name to its known versions. Iteration order is
/// unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChartIndex {
    /// Chart name to versions
    #[serde(default)]
    pub entries: HashMap<String, Vec<String>>,
}

impl ChartIndex {
    /// Names of the charts in the index, unordered
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Fetches and prepares charts from upstream on a cache miss.
#[async_trait::async_trait]
pub trait ChartSource: fmt::Debug + Send + Sync {
    /// Prepare manifests for `repository`.
    ///
    /// With a reference, the returned entries should include that reference.
    /// With `None`, every reference in the repository should be returned.
    /// Implementations should stop work once `cancel` fires.
    async fn prepare(
        &self,
        repository: &str,
        reference: Option<&Reference>,
        cancel: CancellationToken,
    ) -> Result<Prepared, SourceError>;

    /// Look up the index federated under `repository`, if there is one.
    async fn index(&self, repository: &str) -> Result<Option<ChartIndex>, SourceError>;
}
