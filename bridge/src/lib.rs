//! Client-side plumbing for the document bridge: the upstream RPC client,
//! response normalization, the TTL cache, the alias registry, and the
//! fan-out fetcher that combines them.

pub mod cache;
pub mod client;
pub mod fetcher;
pub mod metrics_defs;
pub mod normalize;
pub mod registry;
pub mod resolver;
