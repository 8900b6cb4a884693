//! Fragment and directory indexes for imgmeta.
//!
//! # Architecture
//!
//! - The **fragment index** maps each object path to its ordered fragment
//!   set and answers point, range and index lookups. It is sharded by path
//!   hash; a store or delete locks only the shard of its path.
//! - The **directory index** is a derived view over stored object paths and
//!   explicit directory markers, maintained incrementally on every store and
//!   delete so listings never lag a completed write.
//!
//! Neither index knows about the other. The driver in `imgmeta-store`
//! composes them under one per-path critical section.
//!
//! # Modules
//!
//! - [`fragments`] — [`ObjectFragments`]: one object's records and invariants
//! - [`fragment_index`] — [`FragmentIndex`]: sharded path → fragments map
//! - [`directory`] — [`DirectoryIndex`]: immediate-child listings
//! - [`shards`] — [`Shards`]: hash-sharded `RwLock`s

pub mod directory;
pub mod fragment_index;
pub mod fragments;
pub mod shards;

pub use directory::DirectoryIndex;
pub use fragment_index::{FragmentIndex, FrozenIndex, PathGuard, DEFAULT_SHARDS};
pub use fragments::{ObjectFragments, StoreOutcome};
pub use shards::Shards;
