//! Implement support for the compression and container formats used by the game.

pub mod one;
pub mod prs;
