//! Foundation types for imgmeta, the metadata layer of the image store.
//!
//! Every stored object is split by the ingest layer into contiguous byte
//! ranges ("fragments"). Each fragment lives in one backend file inside one
//! storage group. This crate defines the records that describe those
//! fragments and the error taxonomy shared by every other imgmeta crate.
//!
//! # Key Types
//!
//! - [`FragmentRecord`] — one fragment: index, byte range, group/file ids
//! - [`MetaInfo`] — a path plus an optional record, as handed over by ingest
//! - [`ObjectSummary`] — completeness and coverage of one object
//! - [`MetaError`] — every error an imgmeta operation can return

pub mod error;
pub mod record;
pub mod summary;

pub use error::{MetaError, Result};
pub use record::{FileId, FragmentRecord, GroupId, MetaInfo};
pub use summary::ObjectSummary;
