// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pager configuration loaded from environment variables.

use crate::cache::{CachePolicy, CacheUsage};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Pager configuration.
#[derive(Debug, Clone)]
pub struct PagerConfig {
    /// Tile level at which buildings are paged.
    pub lod: u32,
    /// Visible range as a multiple of the tile radius.
    pub range_factor: f64,
    /// Directory for the tile cache.
    pub cache_dir: String,
    /// Explicit cache bin name; derived from the compiler settings when unset.
    pub cache_id: Option<String>,
    /// Cache read/write usage.
    pub cache_usage: CacheUsage,
    /// Maximum age of a cached tile; unset means tiles never expire.
    pub cache_max_age_secs: Option<u64>,
    /// Capacity of the terrain tile LRU.
    pub terrain_cache_entries: usize,
    /// How long to wait for another thread's terrain fetch.
    pub terrain_timeout_secs: u64,
    /// Terrain level sampled for clamping.
    pub clamp_lod: u32,
    /// Number of worker threads for batch tile builds.
    pub worker_threads: usize,
    /// Collect and report per-tile statistics.
    pub collect_stats: bool,
}

impl PagerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            lod: env_or("BUILDINGS_LOD", 14),
            range_factor: env_or("BUILDINGS_RANGE_FACTOR", 6.0),
            cache_dir: std::env::var("BUILDINGS_CACHE_DIR").unwrap_or_else(|_| {
                std::env::current_dir()
                    .ok()
                    .and_then(|dir| {
                        dir.join(".cache")
                            .join("buildings")
                            .to_str()
                            .map(|s| s.to_string())
                    })
                    .unwrap_or_else(|| "./.cache/buildings".into())
            }),
            cache_id: std::env::var("BUILDINGS_CACHE_ID")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            cache_usage: std::env::var("BUILDINGS_CACHE_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            cache_max_age_secs: std::env::var("BUILDINGS_CACHE_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok()),
            terrain_cache_entries: env_or("BUILDINGS_TERRAIN_CACHE_ENTRIES", 200_000),
            terrain_timeout_secs: env_or("BUILDINGS_TERRAIN_TIMEOUT_SECS", 30),
            clamp_lod: env_or("BUILDINGS_CLAMP_LOD", crate::factory::DEFAULT_CLAMP_LOD),
            worker_threads: std::env::var("WORKER_THREADS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get()),
            collect_stats: env_or("BUILDINGS_COLLECT_STATS", false),
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            usage: self.cache_usage,
            max_age: self.cache_max_age_secs.map(Duration::from_secs),
        }
    }

    pub fn terrain_timeout(&self) -> Duration {
        Duration::from_secs(self.terrain_timeout_secs)
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let mut config = PagerConfig::from_env();
        config.cache_usage = CacheUsage::ReadOnly;
        config.cache_max_age_secs = Some(60);
        let policy = config.cache_policy();
        assert!(policy.is_cache_readable());
        assert!(!policy.is_cache_writeable());
        assert_eq!(policy.max_age, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("SKYLINE_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
