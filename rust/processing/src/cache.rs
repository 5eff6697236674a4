// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tile cache bins and the policy that governs them.
//!
//! A bin is a key/value blob store that remembers when each entry was
//! written. [`DiskCacheBin`] stores gzip-compressed blobs in a cacache
//! directory; [`MemoryCacheBin`] keeps them in a map.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Which cache operations are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheUsage {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
    NoCache,
}

impl FromStr for CacheUsage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read_write" => Ok(CacheUsage::ReadWrite),
            "read_only" => Ok(CacheUsage::ReadOnly),
            "write_only" => Ok(CacheUsage::WriteOnly),
            "no_cache" => Ok(CacheUsage::NoCache),
            other => Err(Error::Config(format!("unknown cache policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    pub usage: CacheUsage,
    /// Entries older than this are misses; `None` never expires
    pub max_age: Option<Duration>,
}

impl CachePolicy {
    pub const NO_CACHE: CachePolicy = CachePolicy {
        usage: CacheUsage::NoCache,
        max_age: None,
    };

    pub fn is_cache_readable(&self) -> bool {
        matches!(self.usage, CacheUsage::ReadWrite | CacheUsage::ReadOnly)
    }

    pub fn is_cache_writeable(&self) -> bool {
        matches!(self.usage, CacheUsage::ReadWrite | CacheUsage::WriteOnly)
    }

    pub fn is_expired(&self, last_modified: SystemTime) -> bool {
        match self.max_age {
            Some(max_age) => SystemTime::now()
                .duration_since(last_modified)
                .map(|age| age > max_age)
                .unwrap_or(false),
            None => false,
        }
    }
}

/// A blob read back from a bin
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub data: Vec<u8>,
    pub last_modified: SystemTime,
}

/// Key/value blob store shared by concurrent tile builds.
///
/// Reads may run concurrently. Two writers racing on one key leave one of
/// the two blobs; either is acceptable.
pub trait CacheBin: Send + Sync {
    fn id(&self) -> &str;

    /// `Ok(None)` on a miss
    fn read(&self, key: &str) -> Result<Option<CacheRecord>>;

    fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Bin name for a settings document and paging level. A changed
/// configuration lands in a different bin.
pub fn bin_id_for(settings_json: &str, lod: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(settings_json.as_bytes());
    hasher.update(lod.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Disk bin backed by cacache, one directory per bin
#[derive(Debug, Clone)]
pub struct DiskCacheBin {
    id: String,
    path: PathBuf,
}

impl DiskCacheBin {
    /// Open (creating if needed) the bin `id` under `cache_dir`.
    pub fn open(cache_dir: impl AsRef<Path>, id: &str) -> Result<Self> {
        let path = cache_dir.as_ref().join(id);
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            id: id.to_string(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

impl CacheBin for DiskCacheBin {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        let Some(metadata) = cacache::metadata_sync(&self.path, key)? else {
            return Ok(None);
        };
        let compressed = match cacache::read_hash_sync(&self.path, &metadata.integrity) {
            Ok(data) => data,
            Err(cacache::Error::EntryNotFound(_, _)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let last_modified = UNIX_EPOCH + Duration::from_millis(metadata.time as u64);
        Ok(Some(CacheRecord {
            data: Self::decompress(&compressed)?,
            last_modified,
        }))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let compressed = Self::compress(data)?;
        cacache::write_sync(&self.path, key, &compressed)?;
        tracing::debug!(bin = %self.id, key = %key, size = compressed.len(), "Cached tile");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        cacache::remove_sync(&self.path, key)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        cacache::clear_sync(&self.path)?;
        Ok(())
    }
}

/// In-memory bin
#[derive(Debug, Default)]
pub struct MemoryCacheBin {
    id: String,
    entries: RwLock<FxHashMap<String, CacheRecord>>,
}

impl MemoryCacheBin {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Store an entry with an explicit modification time
    pub fn write_at(&self, key: &str, data: &[u8], last_modified: SystemTime) {
        self.entries.write().insert(
            key.to_string(),
            CacheRecord {
                data: data.to_vec(),
                last_modified,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheBin for MemoryCacheBin {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.write_at(key, data, SystemTime::now());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_parsing() {
        assert_eq!("read_only".parse::<CacheUsage>().unwrap(), CacheUsage::ReadOnly);
        assert_eq!(" NO_CACHE ".parse::<CacheUsage>().unwrap(), CacheUsage::NoCache);
        assert!("sometimes".parse::<CacheUsage>().is_err());
    }

    #[test]
    fn test_policy_expiry() {
        let policy = CachePolicy {
            usage: CacheUsage::ReadWrite,
            max_age: Some(Duration::from_secs(60)),
        };
        assert!(!policy.is_expired(SystemTime::now()));
        assert!(policy.is_expired(SystemTime::now() - Duration::from_secs(120)));
        assert!(!CachePolicy::default().is_expired(UNIX_EPOCH));
        assert!(!CachePolicy::NO_CACHE.is_cache_readable());
    }

    #[test]
    fn test_bin_id_depends_on_settings_and_lod() {
        let a = bin_id_for("{}", 14);
        assert_eq!(a, bin_id_for("{}", 14));
        assert_ne!(a, bin_id_for("{}", 15));
        assert_ne!(a, bin_id_for(r#"{"bins":[]}"#, 14));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_disk_bin_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bin = DiskCacheBin::open(dir.path(), "tiles").unwrap();
        assert!(bin.read("14_0_0/14_3_4").unwrap().is_none());

        bin.write("14_0_0/14_3_4", b"tile data").unwrap();
        let record = bin.read("14_0_0/14_3_4").unwrap().unwrap();
        assert_eq!(record.data, b"tile data");
        assert!(record.last_modified <= SystemTime::now());

        bin.write("14_0_0/14_3_4", b"newer").unwrap();
        assert_eq!(bin.read("14_0_0/14_3_4").unwrap().unwrap().data, b"newer");

        bin.remove("14_0_0/14_3_4").unwrap();
        assert!(bin.read("14_0_0/14_3_4").unwrap().is_none());
    }

    #[test]
    fn test_disk_bin_clear() {
        let dir = tempfile::tempdir().unwrap();
        let bin = DiskCacheBin::open(dir.path(), "tiles").unwrap();
        bin.write("a", b"1").unwrap();
        bin.write("b", b"2").unwrap();
        bin.clear().unwrap();
        assert!(bin.read("a").unwrap().is_none());
        assert!(bin.read("b").unwrap().is_none());
    }

    #[test]
    fn test_memory_bin() {
        let bin = MemoryCacheBin::new("mem");
        bin.write("k", b"v").unwrap();
        assert_eq!(bin.len(), 1);
        assert_eq!(bin.read("k").unwrap().unwrap().data, b"v");
        bin.clear().unwrap();
        assert!(bin.is_empty());
    }
}
