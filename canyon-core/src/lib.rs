//! This crate implements the data-ingestion core of the canyon level tools
//!
//! This mostly includes PRS decompression and reading of ONE archives, the containers
//!     Sonic Heroes ships its level assets in. Interpreting the decoded payloads is left to the caller.

#![allow(clippy::uninlined_format_args)]

pub mod diagnostics;
pub mod format;

pub use canyon_primitives as primitives;
