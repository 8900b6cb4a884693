//! Path codec for imgmeta.
//!
//! Objects are addressed by slash-segmented paths such as `/img/2024/cat.jpg`.
//! The codec turns caller input into a [`CanonicalPath`] and answers the
//! structural questions the indexes need: parent, final segment, and whether
//! a path is a directory marker.
//!
//! # Conventions
//!
//! - Segments are joined by a single separator character (default `/`).
//! - A final segment starting with the directory prefix (default
//!   `DIRECTORY_`) is a *directory marker*: `/a/DIRECTORY_x` stands for the
//!   possibly empty directory `/a/x`.
//! - A final segment starting with the tag prefix (default `tag_`) is a tag.
//!   Tags are informational and get no special treatment in the indexes.
//!
//! # Modules
//!
//! - [`namespace`] — The [`Namespace`] configuration (separator, prefixes)
//! - [`codec`] — [`PathCodec`] and [`CanonicalPath`]

pub mod codec;
pub mod namespace;

pub use codec::{CanonicalPath, PathCodec};
pub use namespace::Namespace;
