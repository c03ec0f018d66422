//! Metric names for the bridge crate.

pub const CACHE_HIT: &str = "bridge.cache.hit";
pub const CACHE_MISS: &str = "bridge.cache.miss";
pub const FETCH_FAILED: &str = "bridge.fetch.failed";
