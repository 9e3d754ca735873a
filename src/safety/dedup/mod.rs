use moka::sync::Cache;
use std::time::Duration;

const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Time-bounded set of message ids that have already been accepted.
///
/// Clones share the same underlying cache.
#[derive(Clone)]
pub struct DedupLedger {
    seen: Cache<String, ()>,
    horizon: Duration,
}

impl DedupLedger {
    pub fn new(horizon: Duration) -> Self {
        Self::with_capacity(horizon, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(horizon: Duration, max_entries: u64) -> Self {
        Self {
            seen: Cache::builder()
                .time_to_live(horizon)
                .max_capacity(max_entries)
                .build(),
            horizon,
        }
    }

    /// Returns `true` and records `id` if it has not been seen within the
    /// horizon, `false` on a repeat. Check and insert happen atomically.
    pub fn seen_or_record(&self, id: &str) -> bool {
        self.seen.entry(id.to_string()).or_insert(()).is_fresh()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }
}

impl std::fmt::Debug for DedupLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupLedger")
            .field("horizon", &self.horizon)
            .field("entries", &self.seen.entry_count())
            .finish()
    }
}
