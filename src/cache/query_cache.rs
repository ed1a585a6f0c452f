//! Keyed, time-stamped cache of fetched values with in-flight request sharing.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use super::key::QueryKey;
use super::result::{CacheResult, CacheSource, Cached};

type Value = Arc<dyn Any + Send + Sync>;
type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<Arc<T>, E>>>;

/// Prefixes passed to one `invalidate_all` call.
pub type Invalidation = Arc<[QueryKey]>;

const INVALIDATION_BACKLOG: usize = 64;

struct Entry {
  value: Value,
  fetched_at: Instant,
  stale_after: Duration,
  /// Set by `invalidate`; cleared only by storing a newer value
  invalidated: bool,
}

impl Entry {
  fn is_fresh(&self, now: Instant) -> bool {
    !self.invalidated && now.saturating_duration_since(self.fetched_at) < self.stale_after
  }
}

struct InFlight {
  id: u64,
  /// Slot generation when the fetch started
  generation: u64,
  /// A `SharedFetch<T, E>` for the caller's `T` and `E`
  fetch: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Slot {
  entry: Option<Entry>,
  in_flight: Option<InFlight>,
  /// Bumped on every invalidation that matches this key
  generation: u64,
}

struct Inner {
  slots: Mutex<HashMap<QueryKey, Slot>>,
  next_fetch: AtomicU64,
  invalidations: broadcast::Sender<Invalidation>,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
    // Critical sections never panic midway, the map is consistent either way
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Record the outcome of fetch `id`. Failures leave the entry untouched.
  fn complete<T, E>(&self, key: &QueryKey, id: u64, stale_after: Duration, result: &Result<Arc<T>, E>)
  where
    T: Send + Sync + 'static,
  {
    let mut slots = self.lock();
    let Some(slot) = slots.get_mut(key) else {
      return;
    };

    let started_at_generation = match &slot.in_flight {
      Some(in_flight) if in_flight.id == id => in_flight.generation,
      // Superseded by a fetch of a different value type
      _ => return,
    };
    slot.in_flight = None;

    match result {
      Ok(value) => {
        let value: Value = value.clone();
        let invalidated = slot.generation != started_at_generation;
        if invalidated {
          debug!(key = %key, "invalidated while fetching, storing as stale");
        }
        slot.entry = Some(Entry {
          value,
          fetched_at: Instant::now(),
          stale_after,
          invalidated,
        });
      }
      Err(_) => {
        debug!(key = %key, kept = slot.entry.is_some(), "fetch failed, entry unchanged");
      }
    }
  }
}

/// Query cache shared by every view.
///
/// - A fresh entry is served without calling the fetcher.
/// - A stale or missing entry triggers exactly one fetch per key; concurrent
///   callers for the same key await that same fetch.
/// - `invalidate` marks entries stale without removing them and tells every
///   subscriber which prefixes were hit.
///
/// Values are stored type-erased; the caller's `T` selects them again. Reading
/// a key with a different `T` than it was stored with behaves like a miss.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

impl QueryCache {
  pub fn new() -> Self {
    let (invalidations, _) = broadcast::channel(INVALIDATION_BACKLOG);
    Self {
      inner: Arc::new(Inner {
        slots: Mutex::new(HashMap::new()),
        next_fetch: AtomicU64::new(0),
        invalidations,
      }),
    }
  }

  /// Receive the prefixes of every later `invalidate` / `invalidate_all`.
  pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
    self.inner.invalidations.subscribe()
  }

  /// Return the value for `key`, fetching it when the entry is missing or stale.
  ///
  /// `fetcher` is only called when this call has to start a new fetch. It is
  /// called while the cache is locked and must not use the cache itself
  /// before its future is first polled.
  ///
  /// A fetch keeps running on its own task even if every caller stops
  /// waiting for it. On failure the error goes to every waiting caller and
  /// the previous entry, fresh or stale, is kept.
  pub async fn get<T, E, F, Fut>(
    &self,
    key: &QueryKey,
    stale_after: Duration,
    fetcher: F,
  ) -> Result<CacheResult<T>, E>
  where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let (fetch, source) = {
      let mut slots = self.inner.lock();
      let slot = slots.entry(key.clone()).or_default();

      if let Some(entry) = &slot.entry {
        if entry.is_fresh(Instant::now()) {
          if let Ok(value) = Arc::clone(&entry.value).downcast::<T>() {
            debug!(key = %key, "cache hit");
            return Ok(CacheResult::from_cache(T::clone(&value)));
          }
        }
      }

      let joined = slot
        .in_flight
        .as_ref()
        .and_then(|in_flight| in_flight.fetch.downcast_ref::<SharedFetch<T, E>>())
        .cloned();

      match joined {
        Some(fetch) => {
          debug!(key = %key, "joining in-flight fetch");
          (fetch, CacheSource::Shared)
        }
        None => {
          debug!(key = %key, "cache miss, fetching");
          let fetch = self.start_fetch(key, slot, stale_after, fetcher());
          (fetch, CacheSource::Network)
        }
      }
    };

    let value = fetch.await?;
    Ok(CacheResult {
      data: T::clone(&value),
      source,
    })
  }

  fn start_fetch<T, E, Fut>(
    &self,
    key: &QueryKey,
    slot: &mut Slot,
    stale_after: Duration,
    fut: Fut,
  ) -> SharedFetch<T, E>
  where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
    let inner = Arc::downgrade(&self.inner);
    let owned_key = key.clone();

    let fetch = async move {
      let result = fut.await.map(Arc::new);
      if let Some(inner) = inner.upgrade() {
        inner.complete(&owned_key, id, stale_after, &result);
      }
      result
    }
    .boxed()
    .shared();

    slot.in_flight = Some(InFlight {
      id,
      generation: slot.generation,
      fetch: Box::new(fetch.clone()),
    });

    // Drive the request to completion even if every waiter goes away
    let driver = fetch.clone();
    tokio::spawn(async move {
      let _ = driver.await;
    });

    fetch
  }

  /// Mark every entry under `prefix` stale. Returns how many keys matched.
  pub fn invalidate(&self, prefix: &QueryKey) -> usize {
    self.invalidate_all(std::slice::from_ref(prefix))
  }

  /// Mark every entry under any of `prefixes` stale, in one critical section.
  pub fn invalidate_all(&self, prefixes: &[QueryKey]) -> usize {
    let mut slots = self.inner.lock();
    let mut matched = 0;

    for (key, slot) in slots.iter_mut() {
      if prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        slot.generation += 1;
        if let Some(entry) = &mut slot.entry {
          entry.invalidated = true;
        }
        matched += 1;
      }
    }

    drop(slots);

    debug!(matched, prefixes = prefixes.len(), "invalidated cache keys");
    // No subscribers is fine
    let _ = self.inner.invalidations.send(prefixes.into());
    matched
  }

  /// Current value for `key` without fetching, if one of type `T` is stored.
  pub fn peek<T>(&self, key: &QueryKey) -> Option<Cached<T>>
  where
    T: Clone + Send + Sync + 'static,
  {
    let slots = self.inner.lock();
    let entry = slots.get(key)?.entry.as_ref()?;
    let value = Arc::clone(&entry.value).downcast::<T>().ok()?;

    Some(Cached {
      data: T::clone(&value),
      is_fresh: entry.is_fresh(Instant::now()),
    })
  }

  /// Whether a fetch for `key` is currently running.
  pub fn is_fetching(&self, key: &QueryKey) -> bool {
    self
      .inner
      .lock()
      .get(key)
      .is_some_and(|slot| slot.in_flight.is_some())
  }

  /// Drop entries that were last fetched at least `max_idle` ago and have no
  /// fetch in flight. Returns how many keys were removed.
  pub fn prune(&self, max_idle: Duration) -> usize {
    let now = Instant::now();
    let mut slots = self.inner.lock();
    let before = slots.len();

    slots.retain(|_, slot| {
      if slot.in_flight.is_some() {
        return true;
      }
      match &slot.entry {
        Some(entry) => now.saturating_duration_since(entry.fetched_at) < max_idle,
        None => false,
      }
    });

    let removed = before - slots.len();
    if removed > 0 {
      debug!(removed, "pruned idle cache keys");
    }
    removed
  }

  /// Number of keys holding a value.
  pub fn len(&self) -> usize {
    self
      .inner
      .lock()
      .values()
      .filter(|slot| slot.entry.is_some())
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}
