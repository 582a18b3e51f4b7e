use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use uuid::Uuid;

/// Mints merchant references of the form `merch_<nanos>_<userId>`.
///
/// The time component is a per-process monotonic high-water mark: two calls
/// landing on the same nanosecond still produce distinct references. The
/// database unique constraint on the column stays authoritative across
/// processes; an insert-time violation means "generate again", not a fatal
/// error.
pub struct MerchantReferenceGenerator {
    last_nanos: AtomicI64,
}

impl MerchantReferenceGenerator {
    pub fn new() -> Self {
        Self {
            last_nanos: AtomicI64::new(0),
        }
    }

    pub fn generate(&self, user_id: Uuid) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        self.generate_at(user_id, now)
    }

    /// Clock injected for tests that force a collision.
    pub fn generate_at(&self, user_id: Uuid, now_nanos: i64) -> String {
        let nanos = self.claim(now_nanos);
        format!("merch_{nanos}_{user_id}")
    }

    // next = max(last + 1, now)
    fn claim(&self, now_nanos: i64) -> i64 {
        let prev = match self.last_nanos.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(last.max(now_nanos.saturating_sub(1)) + 1)
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        prev.max(now_nanos.saturating_sub(1)) + 1
    }
}

impl Default for MerchantReferenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_carries_time_and_user() {
        let generator = MerchantReferenceGenerator::new();
        let user_id = Uuid::new_v4();
        let reference = generator.generate_at(user_id, 1_700_000_000_000_000_000);
        assert_eq!(
            reference,
            format!("merch_1700000000000000000_{user_id}")
        );
    }

    #[test]
    fn same_nanosecond_yields_distinct_references() {
        let generator = MerchantReferenceGenerator::new();
        let user_id = Uuid::new_v4();
        let first = generator.generate_at(user_id, 42);
        let second = generator.generate_at(user_id, 42);
        assert_ne!(first, second);
    }

    #[test]
    fn time_component_never_goes_backwards() {
        let generator = MerchantReferenceGenerator::new();
        let user_id = Uuid::new_v4();
        generator.generate_at(user_id, 1000);
        let stale_clock = generator.generate_at(user_id, 500);
        assert_eq!(stale_clock, format!("merch_1001_{user_id}"));
    }
}
