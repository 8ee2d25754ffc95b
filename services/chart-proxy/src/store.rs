//! The manifest cache
//!
//! Repositories are sharded across a [`DashMap`], and no lock is held while a
//! chart is being fetched. Misses go through a keyed single-flight: concurrent
//! misses on the same repository and reference share one call to the chart
//! source, while misses elsewhere and cache hits carry on independently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use echocache::Flights;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, RegistryResult};
use crate::manifest::Manifest;
use crate::reference::Reference;
use crate::source::{ChartSource, Prepared, SourceError};

type Repository = BTreeMap<Reference, Manifest>;

/// Outcome of one population, shared by every caller waiting on it.
type Population = Result<(), Arc<SourceError>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    repository: String,
    /// `None` populates the whole repository
    reference: Option<Reference>,
}

/// Concurrent cache of repository → reference → manifest, filled lazily from a
/// [`ChartSource`].
///
/// Cloning is cheap; clones share the same cache.
#[derive(Debug, Clone)]
pub struct Manifests {
    repositories: Arc<DashMap<String, Repository>>,
    flights: Flights<FlightKey, Population>,
    source: Arc<dyn ChartSource>,
    ttl: Option<TimeDelta>,
}

impl Manifests {
    /// Create an empty cache in front of `source`
    pub fn new<S: ChartSource + 'static>(source: S) -> Self {
        Self::shared(Arc::new(source))
    }

    /// Create an empty cache in front of a shared `source`
    pub fn shared(source: Arc<dyn ChartSource>) -> Self {
        Self {
            repositories: Default::default(),
            flights: Flights::new(),
            source,
            ttl: None,
        }
    }

    /// Expire entries `ttl` after they were cached
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = TimeDelta::from_std(ttl).ok();
        self
    }

    /// The configured time-to-live, if any
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| ttl.to_std().ok())
    }

    /// The chart source used to populate the cache
    pub fn source(&self) -> &dyn ChartSource {
        self.source.as_ref()
    }

    /// Insert or replace a single entry
    pub fn insert(&self, repository: impl Into<String>, reference: Reference, manifest: Manifest) {
        self.insert_all(repository.into(), vec![(reference, manifest)], Utc::now());
    }

    /// Insert a batch under one shard lock, so readers see all of it or none.
    fn insert_all(&self, repository: String, entries: Prepared, now: DateTime<Utc>) {
        if entries.is_empty() {
            return;
        }

        let mut repo = self.repositories.entry(repository).or_default();
        for (reference, manifest) in entries {
            repo.insert(reference, manifest.stamped(now));
        }
    }

    /// A live cached entry, without populating on a miss
    pub fn cached(&self, repository: &str, reference: &Reference) -> Option<Manifest> {
        let now = Utc::now();
        let repo = self.repositories.get(repository)?;
        repo.get(reference)
            .filter(|manifest| !manifest.is_expired(self.ttl, now))
            .cloned()
    }

    /// True if the repository holds at least one live entry
    pub fn contains_repository(&self, repository: &str) -> bool {
        let now = Utc::now();
        self.repositories.get(repository).is_some_and(|repo| {
            repo.values()
                .any(|manifest| !manifest.is_expired(self.ttl, now))
        })
    }

    /// Get a manifest, populating it from the chart source on a miss.
    ///
    /// The source is asked at most once per call. If the entry is still absent
    /// afterwards the manifest is reported as not found.
    #[tracing::instrument(skip(self, reference), fields(%reference))]
    pub async fn get(&self, repository: &str, reference: &Reference) -> RegistryResult<Manifest> {
        if let Some(manifest) = self.cached(repository, reference) {
            tracing::trace!("Cache hit");
            return Ok(manifest);
        }

        tracing::debug!("Cache miss");
        self.populate(repository, Some(reference)).await?;
        self.cached(repository, reference)
            .ok_or_else(|| RegistryError::NotFound(format!("{repository}:{reference}")))
    }

    /// Sorted tags of a repository, populating the whole repository if it is
    /// not cached. Digest references are never listed.
    #[tracing::instrument(skip(self))]
    pub async fn tags(&self, repository: &str) -> RegistryResult<Vec<String>> {
        if !self.contains_repository(repository) {
            tracing::debug!("Repository miss");
            self.populate(repository, None).await?;
        }

        let now = Utc::now();
        let mut tags: Vec<String> = self
            .repositories
            .get(repository)
            .map(|repo| {
                repo.iter()
                    .filter(|(_, manifest)| !manifest.is_expired(self.ttl, now))
                    .filter_map(|(reference, _)| reference.as_tag().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        tags.sort();
        Ok(tags)
    }

    /// The first `n` cached repository names, sorted
    pub fn repositories(&self, n: usize) -> Vec<String> {
        let now = Utc::now();
        let mut names: Vec<String> = self
            .repositories
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .values()
                    .any(|manifest| !manifest.is_expired(self.ttl, now))
            })
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names.truncate(n);
        names
    }

    /// The first `n` charts of the index federated under `parent`, sorted and
    /// prefixed with `parent`. The local cache is not consulted.
    #[tracing::instrument(skip(self))]
    pub async fn federated(&self, parent: &str, n: usize) -> RegistryResult<Vec<String>> {
        let index = self.source.index(parent).await?;

        let mut names: Vec<String> = index
            .iter()
            .flat_map(|index| index.names())
            .map(|name| format!("{parent}/{name}"))
            .collect();
        names.sort();
        names.truncate(n);
        Ok(names)
    }

    /// Remove expired entries and repositories left empty. Returns the number
    /// of entries removed.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let now = Utc::now();
        let mut purged = 0;
        self.repositories.retain(|_, repo| {
            let before = repo.len();
            repo.retain(|_, manifest| !manifest.is_expired(Some(ttl), now));
            purged += before - repo.len();
            !repo.is_empty()
        });
        purged
    }

    /// Purge expired entries every `period`. Returns `None` when no TTL is set.
    pub fn spawn_sweeper(&self, period: Duration) -> Option<JoinHandle<()>> {
        self.ttl?;
        if period.is_zero() {
            return None;
        }

        let manifests = self.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let purged = manifests.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired manifests");
                }
            }
        }))
    }

    /// Join or start the population flight for this key.
    async fn populate(&self, repository: &str, reference: Option<&Reference>) -> RegistryResult<()> {
        let key = FlightKey {
            repository: repository.to_owned(),
            reference: reference.cloned(),
        };

        let manifests = self.clone();
        let handle = self.flights.handle(key.clone(), move |cancel| {
            Box::pin(manifests.fill(key, cancel))
        });

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(RegistryError::Source(error)),
            Err(_) => Err(RegistryError::Abandoned),
        }
    }

    async fn fill(self, key: FlightKey, cancel: CancellationToken) -> Population {
        let FlightKey {
            repository,
            reference,
        } = key;

        // A flight which finished just before this one started may already
        // have filled the entry.
        let present = match &reference {
            Some(reference) => self.cached(&repository, reference).is_some(),
            None => self.contains_repository(&repository),
        };
        if present {
            tracing::trace!(%repository, "Already populated");
            return Ok(());
        }

        tracing::debug!(%repository, ?reference, "Preparing chart");
        match self
            .source
            .prepare(&repository, reference.as_ref(), cancel)
            .await
        {
            Ok(entries) => {
                tracing::debug!(%repository, entries = entries.len(), "Prepared chart");
                self.insert_all(repository, entries, Utc::now());
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%repository, ?reference, %error, "Chart preparation failed");
                Err(Arc::new(error))
            }
        }
    }
}
