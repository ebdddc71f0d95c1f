//! Discord-facing presentation helpers.

pub mod embeds;
