//! Values handed back by the query cache, tagged with where they came from.

/// Result from a cache read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Data this call fetched itself.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Data fetched by another caller's in-flight request for the same key.
  pub fn shared(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Shared,
    }
  }

  /// Data served from a fresh entry without touching the network.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
    }
  }

  pub fn into_inner(self) -> T {
    self.data
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// This call ran the fetcher
  Network,
  /// Joined a fetch that was already in flight for the key
  Shared,
  /// Fresh entry, no fetch
  CacheFresh,
}

/// Snapshot of an entry returned by `peek`, usable as a placeholder while a
/// refetch runs.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  pub data: T,
  pub is_fresh: bool,
}
