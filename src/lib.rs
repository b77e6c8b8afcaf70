//! sheet-gist-sync - Mirrors tracked views of a spreadsheet into a GitHub gist
//!
//! This crate polls a spreadsheet's CSV export, renders a fixed set of
//! categories as markdown and writes the ones that changed into a gist
//! through a single-flight, rate-limit-aware GitHub client.

pub mod config;
pub mod detect;
pub mod error;
pub mod github;
pub mod logging;
pub mod notify;
pub mod source;
pub mod sync;
