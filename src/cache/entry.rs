//! Cache Entry Module
//!
//! Defines the stored record for one effective key, the shared millisecond
//! clock, and TTL clamping.

use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A single stored record: encoded payload plus expiry and read metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encoded (and possibly deflated) payload
    pub payload: Vec<u8>,
    /// Instant of last write (Unix milliseconds)
    pub created_at: u64,
    /// Expiration instant (Unix milliseconds), None = never expires
    pub expires_at: Option<u64>,
    /// Number of successful reads of this entry
    pub touches: u64,
    /// Whether `payload` was deflated at write time
    pub compressed: bool,
    /// Index of this entry's node in the shard's LRU list
    pub(crate) node: usize,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl_seconds` from now (never, when None).
    pub fn new(payload: Vec<u8>, ttl_seconds: Option<u64>, compressed: bool) -> Self {
        let now = now_ms();
        Self {
            payload,
            created_at: now,
            expires_at: ttl_seconds.map(|ttl| now + ttl * 1000),
            touches: 0,
            compressed,
            node: usize::MAX,
        }
    }

    /// True once the current time has reached the expiration instant.
    ///
    /// A TTL of zero therefore expires immediately: `expires_at == created_at`
    /// and `now >= expires_at` holds from the same timestamp on.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Remaining lifetime in whole seconds; None when the entry never
    /// expires, Some(0) once elapsed.
    pub fn ttl_remaining(&self, now: u64) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(now) / 1000)
    }

    /// The duration this entry was originally given, in milliseconds.
    pub fn original_duration_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(self.created_at))
    }
}

// == Clock ==
/// Current Unix timestamp in milliseconds.
///
/// Both the write path and the sweeper derive expiry from this clock, so
/// the two expiration paths always agree.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == TTL Clamp ==
/// Resolves the TTL for a write: the requested value, else the default,
/// capped at `max_ttl` when one is configured. None never expires.
pub fn effective_ttl(
    requested: Option<u64>,
    default_ttl: Option<u64>,
    max_ttl: Option<u64>,
) -> Option<u64> {
    let chosen = requested.or(default_ttl)?;
    Some(match max_ttl {
        Some(max) => chosen.min(max),
        None => chosen,
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(b"v".to_vec(), None, false);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(now_ms()));
        assert_eq!(entry.touches, 0);
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(b"v".to_vec(), Some(60), false);
        assert_eq!(entry.expires_at, Some(entry.created_at + 60_000));
        assert!(!entry.is_expired(now_ms()));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let entry = CacheEntry::new(b"v".to_vec(), Some(0), false);
        assert!(entry.is_expired(entry.created_at));
    }

    #[test]
    fn test_expiration_boundary() {
        let entry = CacheEntry::new(b"v".to_vec(), Some(1), false);
        let expires = entry.expires_at.unwrap();
        assert!(!entry.is_expired(expires - 1));
        assert!(entry.is_expired(expires));
        assert!(entry.is_expired(expires + 1));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(b"v".to_vec(), Some(10), false);
        let remaining = entry.ttl_remaining(entry.created_at).unwrap();
        assert_eq!(remaining, 10);
        assert_eq!(
            entry.ttl_remaining(entry.created_at + 20_000),
            Some(0),
            "elapsed entries report zero"
        );
        let forever = CacheEntry::new(b"v".to_vec(), None, false);
        assert!(forever.ttl_remaining(now_ms()).is_none());
    }

    #[test]
    fn test_original_duration() {
        let entry = CacheEntry::new(b"v".to_vec(), Some(600), false);
        assert_eq!(entry.original_duration_ms(), Some(600_000));
        let forever = CacheEntry::new(b"v".to_vec(), None, false);
        assert!(forever.original_duration_ms().is_none());
    }

    #[test]
    fn test_effective_ttl_uses_default() {
        assert_eq!(effective_ttl(None, Some(300), None), Some(300));
        assert_eq!(effective_ttl(Some(10), Some(300), None), Some(10));
        assert_eq!(effective_ttl(None, None, None), None);
    }

    #[test]
    fn test_effective_ttl_clamps_to_max() {
        assert_eq!(effective_ttl(Some(300), None, Some(60)), Some(60));
        assert_eq!(effective_ttl(Some(30), None, Some(60)), Some(30));
        assert_eq!(effective_ttl(None, Some(300), Some(60)), Some(60));
        // No TTL chosen means no expiry even under a max
        assert_eq!(effective_ttl(None, None, Some(60)), None);
    }
}
