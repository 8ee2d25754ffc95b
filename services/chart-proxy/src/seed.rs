//! A fixed, in-process chart source
//!
//! [`StaticSource`] serves charts declared up front, either in code or from a
//! [`Seed`] document. Preparing a tag yields the manifest under the tag and
//! under its digest, the same pair an upstream transcoder would produce.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::manifest::{Manifest, OCI_MANIFEST};
use crate::reference::Reference;
use crate::source::{ChartIndex, ChartSource, Prepared, SourceError};

/// Chart source backed by a fixed set of charts and indexes
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    charts: HashMap<String, BTreeMap<String, Manifest>>,
    indexes: HashMap<String, ChartIndex>,
}

impl StaticSource {
    /// An empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chart version, tagged `tag` in `repository`
    pub fn with_chart(
        mut self,
        repository: impl Into<String>,
        tag: impl Into<String>,
        manifest: Manifest,
    ) -> Self {
        self.charts
            .entry(repository.into())
            .or_default()
            .insert(tag.into(), manifest);
        self
    }

    /// Add a federated index under `repository`
    pub fn with_index(mut self, repository: impl Into<String>, index: ChartIndex) -> Self {
        self.indexes.insert(repository.into(), index);
        self
    }

    fn tagged(tag: &str, manifest: &Manifest) -> [(Reference, Manifest); 2] {
        [
            (Reference::Tag(tag.to_owned()), manifest.clone()),
            (Reference::Digest(manifest.digest()), manifest.clone()),
        ]
    }
}

#[async_trait::async_trait]
impl ChartSource for StaticSource {
    async fn prepare(
        &self,
        repository: &str,
        reference: Option<&Reference>,
        cancel: CancellationToken,
    ) -> Result<Prepared, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let charts = self
            .charts
            .get(repository)
            .ok_or_else(|| SourceError::NotFound(repository.to_owned()))?;

        let prepared: Prepared = match reference {
            None => charts
                .iter()
                .flat_map(|(tag, manifest)| Self::tagged(tag, manifest))
                .collect(),
            Some(Reference::Tag(tag)) => {
                let manifest = charts
                    .get(tag)
                    .ok_or_else(|| SourceError::NotFound(format!("{repository}:{tag}")))?;
                Self::tagged(tag, manifest).into()
            }
            Some(Reference::Digest(digest)) => {
                let (tag, manifest) = charts
                    .iter()
                    .find(|(_, manifest)| manifest.digest() == *digest)
                    .ok_or_else(|| SourceError::NotFound(format!("{repository}@{digest}")))?;
                Self::tagged(tag, manifest).into()
            }
        };

        Ok(prepared)
    }

    async fn index(&self, repository: &str) -> Result<Option<ChartIndex>, SourceError> {
        Ok(self.indexes.get(repository).cloned())
    }
}

/// A chart declared in a seed document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedChart {
    /// Repository the chart lives in
    pub repository: String,
    /// Tag naming this version
    pub tag: String,
    /// Manifest media type
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Manifest body
    pub manifest: String,
    /// Digests of blobs the manifest refers to
    #[serde(default)]
    pub refs: Vec<String>,
}

fn default_content_type() -> String {
    OCI_MANIFEST.to_owned()
}

/// Declarative contents for a [`StaticSource`]
///
/// ```toml
/// [[charts]]
/// repository = "charts/app"
/// tag = "1.0.0"
/// manifest = '{"schemaVersion":2}'
///
/// [indexes."charts.example.com".entries]
/// app = ["1.0.0"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Seed {
    /// Chart versions
    #[serde(default)]
    pub charts: Vec<SeedChart>,
    /// Federated indexes, by parent repository
    #[serde(default)]
    pub indexes: HashMap<String, ChartIndex>,
}

impl From<Seed> for StaticSource {
    fn from(seed: Seed) -> Self {
        let source = seed
            .charts
            .into_iter()
            .fold(StaticSource::new(), |source, chart| {
                let manifest =
                    Manifest::new(chart.content_type, chart.manifest).with_refs(chart.refs);
                source.with_chart(chart.repository, chart.tag, manifest)
            });

        seed.indexes
            .into_iter()
            .fold(source, |source, (repository, index)| {
                source.with_index(repository, index)
            })
    }
}
