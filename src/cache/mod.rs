//! Client-side synchronization core.
//!
//! - `QueryCache`: keyed reads with freshness, in-flight sharing and
//!   prefix invalidation
//! - `MutationCoordinator`: writes that invalidate the reads they affect
//! - `QueryKey`: structured keys with segment-wise prefix matching

mod key;
mod mutation;
mod query_cache;
mod result;

pub use key::{KeyPart, QueryKey};
pub use mutation::{Mutation, MutationCoordinator};
pub use query_cache::{Invalidation, QueryCache};
pub use result::{CacheResult, CacheSource, Cached};
