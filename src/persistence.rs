//! Snapshot Persistence Module
//!
//! Saves a warm-boot image of all unexpired entries and restores it
//! through the normal write path, so limits, compression, LRU order and
//! TTL clamping apply to restored entries exactly as to fresh writes.
//!
//! The container carries a version tag and the serializer identifier; a
//! snapshot taken under a different serializer refuses to load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::entry::now_ms;
use crate::cache::Cache;
use crate::codec::{Codec, Strategy};
use crate::error::{CacheError, Result};

/// Version tag written into every snapshot container.
pub const SNAPSHOT_VERSION: u32 = 1;

// == Snapshot Format ==
/// Container serialization for the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Json,
    Binary,
}

impl SnapshotFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "binary",
        }
    }
}

impl std::str::FromStr for SnapshotFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(SnapshotFormat::Json),
            "binary" => Ok(SnapshotFormat::Binary),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown persistence format '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    serializer: Strategy,
    saved_at: String,
    entries: Vec<SnapshotRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    key: String,
    value: serde_json::Value,
    expires_in: Option<u64>,
}

// == Save ==
/// Walks each shard under its mutex and writes the snapshot file.
pub(crate) fn save(cache: &Cache) -> Result<()> {
    let inner = cache.inner();
    let (persistence, serializer, compress) = {
        let config = inner.config.read();
        (
            config.persistence.clone(),
            config.serializer,
            config.compress,
        )
    };
    let codec = Codec::new(serializer, compress);
    let now = now_ms();

    let mut entries = Vec::new();
    {
        let shards = inner.shards.read();
        for shard in shards.iter() {
            let shard = shard.lock();
            for (key, entry) in shard.entries() {
                if entry.is_expired(now) {
                    continue;
                }
                match codec.decode::<serde_json::Value>(&entry.payload, entry.compressed) {
                    Ok(value) => entries.push(SnapshotRecord {
                        key: key.clone(),
                        value,
                        expires_in: entry.ttl_remaining(now),
                    }),
                    Err(e) => {
                        warn!(key = %key, error = %e, "skipping undecodable entry in snapshot")
                    }
                }
            }
        }
    }

    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        serializer,
        saved_at: chrono::Utc::now().to_rfc3339(),
        entries,
    };
    let bytes = match persistence.format {
        SnapshotFormat::Json => {
            serde_json::to_vec(&file).map_err(|e| CacheError::SnapshotFormat(e.to_string()))?
        }
        SnapshotFormat::Binary => {
            rmp_serde::to_vec_named(&file).map_err(|e| CacheError::SnapshotFormat(e.to_string()))?
        }
    };

    if persistence.safe_write {
        write_atomic(&persistence.path, &bytes)?;
    } else {
        fs::write(&persistence.path, &bytes)?;
    }
    info!(
        path = %persistence.path.display(),
        entries = file.entries.len(),
        "snapshot saved"
    );
    Ok(())
}

// == Load ==
/// Restores entries from the snapshot file. A missing file is a no-op.
/// Returns the number of restored entries.
pub(crate) fn load(cache: &Cache) -> Result<usize> {
    let inner = cache.inner();
    let (persistence, serializer, compress, max_ttl) = {
        let config = inner.config.read();
        (
            config.persistence.clone(),
            config.serializer,
            config.compress,
            config.max_ttl,
        )
    };

    let bytes = match fs::read(&persistence.path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let file: SnapshotFile = match persistence.format {
        SnapshotFormat::Json => {
            serde_json::from_slice(&bytes).map_err(|e| CacheError::SnapshotFormat(e.to_string()))?
        }
        SnapshotFormat::Binary => {
            rmp_serde::from_slice(&bytes).map_err(|e| CacheError::SnapshotFormat(e.to_string()))?
        }
    };
    if file.version != SNAPSHOT_VERSION {
        return Err(CacheError::SnapshotVersion(file.version));
    }
    if file.serializer != serializer {
        return Err(CacheError::SnapshotSerializer {
            expected: serializer.as_str().to_string(),
            found: file.serializer.as_str().to_string(),
        });
    }

    let codec = Codec::new(serializer, compress);
    let mut restored = 0;
    for record in file.entries {
        let payload = codec.encode(&record.value)?;
        // An absent expires_in means the entry never expires, so the
        // default TTL must not apply; the max-TTL clamp still does.
        let ttl = record
            .expires_in
            .map(|ttl| max_ttl.map_or(ttl, |max| ttl.min(max)));
        cache.store_encoded(
            record.key,
            None,
            payload,
            ttl,
            codec.compression_enabled(),
            false,
        )?;
        restored += 1;
    }
    Ok(restored)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".tmp.{}.{}", std::process::id(), thread_token()));
    PathBuf::from(name)
}

fn thread_token() -> String {
    // ThreadId has no stable numeric accessor; its Debug form carries one
    format!("{:?}", std::thread::current().id())
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}
