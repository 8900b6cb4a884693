//! Meta driver for imgmeta.
//!
//! This crate exposes the [`MetaDriver`] trait, the single entry point the
//! rest of an image server uses to record where object fragments live and
//! to find them again.
//!
//! # Implementations
//!
//! - [`InMemoryMetaDriver`] — indexes only; state is lost on drop.
//! - [`DurableMetaDriver`] — the same indexes, with every accepted mutation
//!   appended to a CRC-framed log that is replayed on open and can be
//!   compacted into a snapshot.
//!
//! Both are [`MetaStore`] with a different [`Journal`].
//!
//! # Modules
//!
//! - [`traits`] — The [`MetaDriver`] contract
//! - [`driver`] — [`MetaStore`]: codec and indexes under per-path locks
//! - [`journal`] — [`LogRecord`] and the [`Journal`] hook
//! - [`log`] — [`MetaLog`]: the on-disk journal
//! - [`durable`] — opening, replaying and compacting a data directory
//! - [`config`] — [`MetaConfig`] loaded from TOML

pub mod config;
pub mod driver;
pub mod durable;
pub mod journal;
pub mod log;
pub mod traits;

pub use config::{IndexConfig, MetaConfig, StorageConfig};
pub use driver::{InMemoryMetaDriver, MetaStore};
pub use durable::{CompactionStats, DurableMetaDriver};
pub use journal::{Journal, LogRecord, NoJournal};
pub use log::{MetaLog, SyncMode, LOG_FILE_NAME};
pub use traits::MetaDriver;

pub use imgmeta_index::StoreOutcome;
