//! Writes against the remote API that invalidate cached reads on success.

use std::fmt::Display;
use std::future::Future;
use tracing::{info, warn};

use super::key::QueryKey;
use super::query_cache::QueryCache;

type Hook<V> = Box<dyn FnOnce(&V) + Send>;

/// A write together with the key prefixes it makes stale.
pub struct Mutation<T, E> {
  name: &'static str,
  affected: Vec<QueryKey>,
  on_success: Option<Hook<T>>,
  on_error: Option<Hook<E>>,
}

impl<T, E> Mutation<T, E> {
  pub fn new(name: &'static str, affected: Vec<QueryKey>) -> Self {
    Self {
      name,
      affected,
      on_success: None,
      on_error: None,
    }
  }

  /// Run after invalidation, before the result is returned.
  pub fn on_success(mut self, hook: impl FnOnce(&T) + Send + 'static) -> Self {
    self.on_success = Some(Box::new(hook));
    self
  }

  pub fn on_error(mut self, hook: impl FnOnce(&E) + Send + 'static) -> Self {
    self.on_error = Some(Box::new(hook));
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn affected(&self) -> &[QueryKey] {
    &self.affected
  }
}

/// Executes mutations and applies their invalidations.
///
/// Mutations may overlap freely; no ordering is imposed between them. Retries
/// are left to the caller.
#[derive(Clone)]
pub struct MutationCoordinator {
  cache: QueryCache,
}

impl MutationCoordinator {
  pub fn new(cache: QueryCache) -> Self {
    Self { cache }
  }

  /// Await `operation`; on success invalidate every affected prefix at once.
  ///
  /// Errors are returned untouched and invalidate nothing.
  pub async fn run<T, E, Fut>(&self, mutation: Mutation<T, E>, operation: Fut) -> Result<T, E>
  where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    let Mutation {
      name,
      affected,
      on_success,
      on_error,
    } = mutation;

    match operation.await {
      Ok(value) => {
        let matched = self.cache.invalidate_all(&affected);
        info!(mutation = name, prefixes = affected.len(), matched, "mutation succeeded");
        if let Some(hook) = on_success {
          hook(&value);
        }
        Ok(value)
      }
      Err(err) => {
        warn!(mutation = name, error = %err, "mutation failed");
        if let Some(hook) = on_error {
          hook(&err);
        }
        Err(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  const TTL: Duration = Duration::from_secs(300);

  async fn seed(cache: &QueryCache, key: &QueryKey) {
    cache
      .get(key, TTL, || async { Ok::<u32, String>(1) })
      .await
      .unwrap();
  }

  fn is_fresh(cache: &QueryCache, key: &QueryKey) -> bool {
    cache.peek::<u32>(key).unwrap().is_fresh
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_invalidates_exactly_declared_prefixes() {
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());

    let assignment = QueryKey::new("assignment").with(5u64);
    let assignments = QueryKey::new("assignments").with(9u64);
    let course = QueryKey::new("course").with(9u64);
    for key in [&assignment, &assignments, &course] {
      seed(&cache, key).await;
    }

    let mutation = Mutation::new(
      "update_assignment",
      vec![assignment.clone(), QueryKey::new("assignments")],
    );
    let result = coordinator
      .run(mutation, async { Ok::<_, String>("saved") })
      .await;

    assert_eq!(result, Ok("saved"));
    assert!(!is_fresh(&cache, &assignment));
    assert!(!is_fresh(&cache, &assignments));
    assert!(is_fresh(&cache, &course));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_invalidates_nothing() {
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    let assignment = QueryKey::new("assignment").with(5u64);
    seed(&cache, &assignment).await;

    let mutation: Mutation<(), String> = Mutation::new("delete_assignment", vec![assignment.clone()]);
    let result = coordinator
      .run(mutation, async { Err("forbidden".to_string()) })
      .await;

    assert_eq!(result, Err("forbidden".to_string()));
    assert!(is_fresh(&cache, &assignment));
  }

  #[tokio::test]
  async fn test_hooks_run_on_matching_outcome() {
    let coordinator = MutationCoordinator::new(QueryCache::new());
    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));

    let ok = {
      let (s, e) = (Arc::clone(&successes), Arc::clone(&errors));
      Mutation::new("ok", vec![])
        .on_success(move |v: &u32| {
          s.fetch_add(*v as usize, Ordering::SeqCst);
        })
        .on_error(move |_: &String| {
          e.fetch_add(1, Ordering::SeqCst);
        })
    };
    coordinator.run(ok, async { Ok(3) }).await.unwrap();

    let failing = {
      let (s, e) = (Arc::clone(&successes), Arc::clone(&errors));
      Mutation::new("failing", vec![])
        .on_success(move |_: &u32| {
          s.fetch_add(100, Ordering::SeqCst);
        })
        .on_error(move |_: &String| {
          e.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _ = coordinator
      .run(failing, async { Err("nope".to_string()) })
      .await;

    assert_eq!(successes.load(Ordering::SeqCst), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_next_read_after_mutation_refetches() {
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    let key = QueryKey::new("comments").with(12u64);
    seed(&cache, &key).await;

    coordinator
      .run(
        Mutation::new("add_comment", vec![key.clone()]),
        async { Ok::<_, String>(()) },
      )
      .await
      .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let reread = cache
      .get(&key, TTL, move || async move {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok::<u32, String>(2)
      })
      .await
      .unwrap();

    assert_eq!(reread.data, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
