//! Profile store metrics.
//!
//! Counters complement the structured logging on every store operation.

use metrics::{counter, describe_counter};

/// Successful roster writes, labelled by operation.
pub const PROFILE_WRITES: &str = "roster_profile_writes_total";

/// Read-modify-write cycles restarted after losing a version race.
pub const CAS_RETRY: &str = "roster_cas_retry_total";

/// Session cache hits.
pub const SESSION_CACHE_HIT: &str = "roster_session_cache_hit_total";

/// Session cache misses.
pub const SESSION_CACHE_MISS: &str = "roster_session_cache_miss_total";

/// Temporary copies that could not be deleted.
pub const TEMP_CLEANUP_FAILURES: &str = "roster_temp_cleanup_failures_total";

/// Registers all profile metric descriptions.
///
/// Call this once after the metrics recorder is installed.
pub fn register_metrics() {
    describe_counter!(PROFILE_WRITES, "Total roster writes");
    describe_counter!(CAS_RETRY, "Total read-modify-write retries after a version conflict");
    describe_counter!(SESSION_CACHE_HIT, "Total query sessions reused from the cache");
    describe_counter!(SESSION_CACHE_MISS, "Total query sessions created");
    describe_counter!(TEMP_CLEANUP_FAILURES, "Total temporary copies left behind");
    describe_counter!(
        roster_core::bucket::TRANSPORT_RETRY,
        "Total storage requests retried after a transient failure"
    );
}

/// Records a committed roster write.
pub fn record_write(operation: &str) {
    counter!(PROFILE_WRITES, "operation" => operation.to_string()).increment(1);
}

/// Records a CAS retry attempt.
pub fn record_cas_retry(operation: &str) {
    counter!(CAS_RETRY, "operation" => operation.to_string()).increment(1);
}

/// Records a session cache lookup.
pub fn record_session_lookup(hit: bool) {
    if hit {
        counter!(SESSION_CACHE_HIT).increment(1);
    } else {
        counter!(SESSION_CACHE_MISS).increment(1);
    }
}

/// Records a temporary copy that could not be deleted.
pub fn record_cleanup_failure() {
    counter!(TEMP_CLEANUP_FAILURES).increment(1);
}
