//! Shared fixtures for chart proxy tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chart_proxy::{
    CancellationToken, ChartIndex, ChartSource, Manifest, OCI_MANIFEST, Prepared, Reference,
    SourceError, StaticSource,
};
use parking_lot::Mutex;

/// Upstream fixture which counts calls and can be slowed per repository.
#[derive(Debug, Default)]
pub struct Upstream {
    charts: StaticSource,
    calls: AtomicUsize,
    slow: Mutex<Vec<(String, Duration)>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl Upstream {
    pub fn new(charts: StaticSource) -> Arc<Self> {
        Arc::new(Self {
            charts,
            ..Default::default()
        })
    }

    /// Delay preparation of `repository` by `delay`
    pub fn slow(&self, repository: &str, delay: Duration) {
        self.slow.lock().push((repository.to_owned(), delay));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cancellation tokens handed to each preparation, in call order
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().clone()
    }

    /// Wait until at least `n` preparations have started
    pub async fn started(&self, n: usize) {
        while self.calls() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn delay(&self, repository: &str) -> Option<Duration> {
        self.slow
            .lock()
            .iter()
            .find(|(slow, _)| slow == repository)
            .map(|(_, delay)| *delay)
    }
}

#[async_trait::async_trait]
impl ChartSource for Upstream {
    async fn prepare(
        &self,
        repository: &str,
        reference: Option<&Reference>,
        cancel: CancellationToken,
    ) -> Result<Prepared, SourceError> {
        self.tokens.lock().push(cancel.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay(repository) {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            }
        }

        self.charts.prepare(repository, reference, cancel).await
    }

    async fn index(&self, repository: &str) -> Result<Option<ChartIndex>, SourceError> {
        self.charts.index(repository).await
    }
}

pub fn manifest(body: &str) -> Manifest {
    Manifest::new(OCI_MANIFEST, body.to_owned())
}

pub fn tag(name: &str) -> Reference {
    Reference::Tag(name.to_owned())
}

/// `charts/app` with three versions, plus a federated index.
pub fn charts() -> StaticSource {
    StaticSource::new()
        .with_chart("charts/app", "1.0.0", manifest("b"))
        .with_chart("charts/app", "1.1.0", manifest("c"))
        .with_chart("charts/app", "2.0.0", manifest("d"))
        .with_chart("charts/fast", "1.0.0", manifest("fast"))
        .with_chart("charts/slow", "1.0.0", manifest("slow"))
        .with_index(
            "charts.example.com",
            ChartIndex {
                entries: [
                    ("nginx".to_owned(), vec!["1.0.0".to_owned()]),
                    ("app".to_owned(), vec![]),
                    ("redis".to_owned(), vec!["7.0.0".to_owned()]),
                ]
                .into(),
            },
        )
}
