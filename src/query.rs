//! Async request state for views.
//!
//! A view owns one `Query<T>` per thing it displays. The query runs its
//! fetcher on a spawned task and the view polls it on every tick, so the
//! event loop never blocks on the network.
//!
//! # Example
//!
//! ```ignore
//! let client = client.clone();
//! let mut query = Query::new(move || {
//!     let client = client.clone();
//!     async move { client.list_assignments(course_id).await }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```
//!
//! A query that is `watching` a cache key refetches on its own when a
//! mutation anywhere in the app invalidates that key, so views already on
//! the stack pick up changes made by other views.
//!
//! Writes come back through [`Pending`], which carries a single result and
//! is simply dropped along with a view that navigated away.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError as InvalidationRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::api::ApiError;
use crate::cache::{Invalidation, QueryCache, QueryKey};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// The cache key a query reads, and the feed telling it when that key went
/// stale.
struct Watch {
  cache: QueryCache,
  key: QueryKey,
  invalidations: broadcast::Receiver<Invalidation>,
  /// Invalidated after the current data was requested
  outdated: bool,
}

impl Watch {
  /// Drain the feed. Returns true if any invalidation covered our key.
  fn drain(&mut self) -> bool {
    let mut hit = false;
    loop {
      match self.invalidations.try_recv() {
        Ok(prefixes) => hit |= prefixes.iter().any(|p| self.key.starts_with(p)),
        // Missed some; assume ours was among them
        Err(InvalidationRecvError::Lagged(_)) => hit = true,
        Err(InvalidationRecvError::Empty) | Err(InvalidationRecvError::Closed) => return hit,
      }
    }
  }
}

/// Async query for data fetching with state management.
///
/// Query<T> encapsulates:
/// - The fetching logic (via a closure)
/// - Loading/success/error states
/// - Async result handling via channels
/// - The last good value, shown while a refetch is running
pub struct Query<T> {
  state: QueryState<T>,
  placeholder: Option<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, ApiError>>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
  watch: Option<Watch>,
}

impl<T: Clone + Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()` or `refetch()` starts a
  /// request.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      placeholder: None,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60), // Default 1 minute
      watch: None,
    }
  }

  /// Refetch whenever `key` is invalidated in `cache`.
  ///
  /// The fetcher is expected to read `key` through that cache.
  pub fn watching(mut self, cache: &QueryCache, key: QueryKey) -> Self {
    self.watch = Some(Watch {
      invalidations: cache.subscribe(),
      cache: cache.clone(),
      key,
      outdated: false,
    });
    self
  }

  pub fn key(&self) -> Option<&QueryKey> {
    self.watch.as_ref().map(|w| &w.key)
  }

  /// Set the stale time for this query.
  ///
  /// After this duration, the data is considered stale and `is_stale()` returns true.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  /// Value to show until the first fetch lands, e.g. a stale cache entry.
  pub fn with_placeholder(mut self, value: Option<T>) -> Self {
    self.placeholder = value;
    self
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// The fetched data, or the placeholder while loading or after a failure.
  pub fn data(&self) -> Option<&T> {
    self.state.data().or(self.placeholder.as_ref())
  }

  /// True when `data()` is not the result of the latest fetch.
  pub fn is_placeholder(&self) -> bool {
    !self.state.is_success() && self.placeholder.is_some()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  /// Check if the data is stale (older than stale_time).
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Fetch again, even if already loading. The current data stays visible
  /// as the placeholder and the result of any earlier fetch is ignored.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Fetch from the server even if the cached value is still fresh.
  ///
  /// Marks the watched key stale first, which also refreshes every other
  /// query watching it. Without a key this is `refetch`.
  pub fn reload(&mut self) {
    if let Some(watch) = &self.watch {
      watch.cache.invalidate(&watch.key);
    }
    self.refetch();
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived or error occurred).
  /// Call this in your event loop tick handler.
  ///
  /// A watching query whose key was invalidated starts a refetch here, once
  /// any fetch already running has landed.
  pub fn poll(&mut self) -> bool {
    let changed = self.poll_fetch();

    let refetch = match &mut self.watch {
      Some(watch) => {
        watch.outdated |= watch.drain();
        let started = !matches!(self.state, QueryState::Idle);
        let due = watch.outdated && started && !self.state.is_loading();
        if due {
          debug!(key = %watch.key, "watched key invalidated, refetching");
        }
        due
      }
      None => false,
    };
    if refetch {
      self.refetch();
    }

    changed
  }

  fn poll_fetch(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.placeholder = None;
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = QueryState::Error(cancelled());
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    // This fetch sees everything invalidated so far
    if let Some(watch) = &mut self.watch {
      watch.drain();
      watch.outdated = false;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    if let QueryState::Success(data) = std::mem::replace(&mut self.state, QueryState::Loading) {
      self.placeholder = Some(data);
    }

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("placeholder", &self.placeholder)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .field("key", &self.watch.as_ref().map(|w| &w.key))
      .finish_non_exhaustive()
  }
}

fn cancelled() -> ApiError {
  ApiError::Network("request task ended without a result".to_string())
}

/// One in-flight write started by a view.
///
/// The operation runs on its own task. If the view is gone by the time it
/// settles, the result is dropped with the receiver and nothing else happens.
pub struct Pending<T> {
  receiver: oneshot::Receiver<Result<T, ApiError>>,
}

impl<T: Send + 'static> Pending<T> {
  pub fn spawn<Fut>(operation: Fut) -> Self
  where
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (tx, receiver) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(operation.await);
    });
    Self { receiver }
  }

  /// The result, once the operation has settled.
  pub fn poll(&mut self) -> Option<Result<T, ApiError>> {
    match self.receiver.try_recv() {
      Ok(result) => Some(result),
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => Some(Err(cancelled())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{Mutation, MutationCoordinator};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  /// A query reading `key` through `cache`; each network fetch returns the
  /// running count of fetches.
  fn cached_counter(cache: &QueryCache, key: &QueryKey, calls: &Arc<AtomicU32>, delay: Duration) -> Query<u32> {
    let fetch_cache = cache.clone();
    let fetch_key = key.clone();
    let calls = Arc::clone(calls);
    Query::new(move || {
      let cache = fetch_cache.clone();
      let key = fetch_key.clone();
      let calls = Arc::clone(&calls);
      async move {
        let result = cache
          .get(&key, Duration::from_secs(300), move || async move {
            tokio::time::sleep(delay).await;
            Ok::<_, ApiError>(calls.fetch_add(1, Ordering::SeqCst) + 1)
          })
          .await?;
        Ok(result.data)
      }
    })
    .watching(cache, key.clone())
  }

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok(vec![1, 2, 3]) });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_success());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<i32> = Query::new(|| async { Err(ApiError::Forbidden) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert_eq!(query.error(), Some(&ApiError::Forbidden));
  }

  #[tokio::test]
  async fn test_query_stale() {
    let mut query = Query::new(|| async { Ok(42) }).with_stale_time(Duration::ZERO);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    std::thread::sleep(Duration::from_millis(1));
    assert!(query.is_stale());
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(42)
      }
    });

    query.fetch();
    query.fetch();
    assert!(query.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_ignores_earlier_result() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let mut query = Query::new(move || {
      let n = counter_clone.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(n)
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_refetch_keeps_previous_data_as_placeholder() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut query = Query::new(move || {
      let n = counter_clone.fetch_add(1, Ordering::SeqCst);
      async move {
        if n > 0 {
          tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(n)
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data(), Some(&0));

    query.refetch();
    assert!(query.is_loading());
    assert!(query.is_placeholder());
    assert_eq!(query.data(), Some(&0));

    tokio::time::sleep(Duration::from_millis(100)).await;
    query.poll();
    assert!(!query.is_placeholder());
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_failed_refetch_keeps_placeholder() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut query = Query::new(move || {
      let n = counter_clone.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 0 {
          Ok("first".to_string())
        } else {
          Err(ApiError::Network("down".to_string()))
        }
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    query.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    assert!(query.is_error());
    assert_eq!(query.data().map(String::as_str), Some("first"));
  }

  #[tokio::test]
  async fn test_seeded_placeholder() {
    let mut query =
      Query::new(|| async { Ok(2) }).with_placeholder(Some(1));
    assert_eq!(query.data(), Some(&1));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data(), Some(&2));
  }

  #[tokio::test]
  async fn test_pending_delivers_result() {
    let mut pending = Pending::spawn(async { Ok::<_, ApiError>("done") });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(pending.poll(), Some(Ok("done"))));
  }

  #[tokio::test]
  async fn test_pending_empty_until_settled() {
    let mut pending = Pending::spawn(async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok::<_, ApiError>(())
    });
    assert!(pending.poll().is_none());
  }

  #[tokio::test]
  async fn test_dropped_pending_is_noop() {
    let finished = Arc::new(AtomicU32::new(0));
    let flag = finished.clone();
    let pending = Pending::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      flag.fetch_add(1, Ordering::SeqCst);
      Ok::<_, ApiError>(())
    });
    drop(pending);

    tokio::time::sleep(Duration::from_millis(50)).await;
    // The write itself still ran to completion
    assert_eq!(finished.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_mutation_elsewhere_refreshes_watching_query() {
    let cache = QueryCache::new();
    let list_key = QueryKey::new("assignments").with(9u64);
    let calls = Arc::new(AtomicU32::new(0));
    let mut list = cached_counter(&cache, &list_key, &calls, Duration::ZERO);

    list.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    list.poll();
    assert_eq!(list.data(), Some(&1));

    // A detail view saves assignment 5 of course 9
    let mutations = MutationCoordinator::new(cache.clone());
    mutations
      .run(
        Mutation::new(
          "update_assignment",
          vec![QueryKey::new("assignment").with(5u64), list_key.clone()],
        ),
        async { Ok::<_, ApiError>(()) },
      )
      .await
      .unwrap();

    list.poll();
    assert!(list.is_loading());
    assert_eq!(list.data(), Some(&1));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(list.poll());
    assert_eq!(list.data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.peek::<u32>(&list_key).unwrap().is_fresh);
  }

  #[tokio::test]
  async fn test_unrelated_invalidation_leaves_query_alone() {
    let cache = QueryCache::new();
    let list_key = QueryKey::new("assignments").with(9u64);
    let calls = Arc::new(AtomicU32::new(0));
    let mut list = cached_counter(&cache, &list_key, &calls, Duration::ZERO);

    list.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    list.poll();

    cache.invalidate_all(&[
      QueryKey::new("assignments").with(10u64),
      QueryKey::new("course").with(9u64),
    ]);
    assert!(!list.poll());
    assert!(!list.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidated_while_loading_refetches_after_landing() {
    let cache = QueryCache::new();
    let key = QueryKey::new("submissions").with(5u64);
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = cached_counter(&cache, &key, &calls, Duration::from_millis(50));

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.invalidate(&QueryKey::new("submissions"));
    assert!(!query.poll());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(query.poll());
    // The landed value predates the invalidation, so it is fetched again
    assert!(query.is_loading());
    assert_eq!(query.data(), Some(&1));

    tokio::time::sleep(Duration::from_millis(60)).await;
    query.poll();
    assert_eq!(query.data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_reload_skips_fresh_cache_entry() {
    let cache = QueryCache::new();
    let key = QueryKey::new("lectures").with(3u64);
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = cached_counter(&cache, &key, &calls, Duration::ZERO);
    let mut other = cached_counter(&cache, &key, &calls, Duration::ZERO);

    query.fetch();
    other.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    other.poll();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A plain refetch is served from the fresh entry
    query.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    query.reload();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data(), Some(&2));

    // Every query on the key follows
    other.poll();
    tokio::time::sleep(Duration::from_millis(10)).await;
    other.poll();
    assert_eq!(other.data(), Some(&2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
