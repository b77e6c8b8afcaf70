//! GitHub API access
//!
//! - [`client`]: single-flight client with rate-limit wait-and-retry
//! - [`ratelimit`]: rate-limit window parsed from response headers
//! - [`gist`]: gist create/update operations on top of the client

pub mod client;
pub mod gist;
pub mod ratelimit;

pub use client::RateLimitedClient;
pub use gist::{DocumentStore, GistFile, GistFiles, GistStore, Visibility};
pub use ratelimit::RateLimitWindow;
