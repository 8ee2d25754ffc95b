//! Coalesce concurrent requests which share a key.
//!
//! [`Flights`] keeps at most one future in flight per key. Callers which
//! arrive while that future is running subscribe to its result instead of
//! starting their own, and callers for other keys are never held up by it.
//!
//! Each flight owns a [`CancellationToken`]. When every [`Handle`] waiting on
//! a flight has been dropped before it finishes, the token is cancelled and
//! the future is abandoned, so a later caller for the same key starts over.
//! A token whose flight completed is never cancelled.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// A boxed, sendable future.
pub type BoxFut<'f, O> = Pin<Box<dyn Future<Output = O> + Send + 'f>>;

/// Shared by every handle on a flight. Dropping the last one cancels the
/// flight, unless it has already delivered its result.
#[derive(Debug)]
struct Waiters {
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl Drop for Waiters {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) {
            self.token.cancel();
        }
    }
}

#[derive(Debug)]
struct Inflight<T> {
    id: u64,
    sender: Weak<broadcast::Sender<T>>,
    waiters: Weak<Waiters>,
}

impl<T> Inflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn join(&self) -> Option<(broadcast::Receiver<T>, Arc<Waiters>)> {
        // A flight with no waiters left has already been cancelled.
        let waiters = self.waiters.upgrade()?;
        let sender = self.sender.upgrade()?;
        Some((sender.subscribe(), waiters))
    }
}

/// A caller's interest in an in-flight request.
///
/// Resolves to the flight's output, or to a [`RecvError`] if the flight ended
/// without producing one.
pub struct Handle<T> {
    fut: BoxFut<'static, Result<T, RecvError>>,
    _waiters: Arc<Waiters>,
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish()
    }
}

impl<T> Future for Handle<T> {
    type Output = Result<T, RecvError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        self.fut.poll_unpin(cx)
    }
}

impl<T> Handle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(mut reciever: broadcast::Receiver<T>, waiters: Arc<Waiters>) -> Self {
        Self {
            fut: Box::pin(async move { reciever.recv().await }),
            _waiters: waiters,
        }
    }
}

/// A map of in-flight requests, at most one per key.
pub struct Flights<K, T> {
    inflight: Arc<Mutex<HashMap<K, Inflight<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<K, T> fmt::Debug for Flights<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flights")
            .field("inflight", &self.inflight.lock().len())
            .finish()
    }
}

impl<K, T> Clone for Flights<K, T> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, T> Default for Flights<K, T> {
    fn default() -> Self {
        Self {
            inflight: Default::default(),
            next_id: Default::default(),
        }
    }
}

impl<K, T> Flights<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty set of flights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flights which still have someone waiting on them.
    pub fn len(&self) -> usize {
        self.inflight
            .lock()
            .values()
            .filter(|flight| flight.waiters.strong_count() > 0)
            .count()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a handle to the one-and-only inflight request for `key`.
    ///
    /// `f` is only called when no live flight exists for `key`. It receives
    /// the flight's cancellation token, which is cancelled once every handle
    /// has been dropped.
    pub fn handle<F>(&self, key: K, f: F) -> Handle<T>
    where
        F: FnOnce(CancellationToken) -> BoxFut<'static, T>,
    {
        // We must take the lock at this point to prevent another thread
        // from starting this request simultaneously.
        let mut inflight = self.inflight.lock();
        if let Some((rx, waiters)) = inflight.get(&key).and_then(Inflight::join) {
            tracing::trace!(?key, "Joining inflight request");
            return Handle::new(rx, waiters);
        }

        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let waiters = Arc::new(Waiters {
            token: token.clone(),
            finished: Arc::clone(&finished),
        });
        let (tx, rx) = broadcast::channel::<T>(1);
        let tx = Arc::new(tx);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        inflight.insert(
            key.clone(),
            Inflight {
                id,
                sender: Arc::downgrade(&tx),
                waiters: Arc::downgrade(&waiters),
            },
        );

        let fut = (f)(token.clone());
        let map = Arc::clone(&self.inflight);
        tracing::trace!(?key, "Launching new request");
        tokio::spawn(async move {
            let res = tokio::select! {
                res = fut => Some(res),
                _ = token.cancelled() => None,
            };

            // Hold the lock while sending, so that a subscriber can't join
            // after the send and miss the response.
            let mut inflight = map.lock();
            if inflight.get(&key).is_some_and(|flight| flight.id == id) {
                inflight.remove(&key);
            }

            match res {
                Some(value) => {
                    finished.store(true, Ordering::Release);
                    let _ = tx.send(value);
                }
                None => tracing::trace!(?key, "Request abandoned"),
            }
        });

        Handle::new(rx, waiters)
    }

    /// Wait for the inflight request for `key`, starting it with `f` if needed.
    pub async fn get<F>(&self, key: K, f: F) -> Result<T, RecvError>
    where
        F: FnOnce(CancellationToken) -> BoxFut<'static, T>,
    {
        self.handle(key, f).await
    }
}
