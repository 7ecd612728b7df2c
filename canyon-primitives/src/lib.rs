//! A utility crate with the leaf building blocks of the archive tooling, light on dependencies.
//!
//! [`buffer`] holds the seekable byte buffer everything else reads from and writes to,
//! [`source`] abstracts over where archive bytes come from.

pub mod buffer;
pub mod source;
