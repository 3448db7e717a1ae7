//! Coordination-store key conventions (SPEC_FULL.md §3).

pub fn seat_lock(seat_id: &str) -> String {
    format!("lock:seat:{seat_id}")
}

pub fn idempotency(user_id: &str, key: &str) -> String {
    format!("idem:reservation:{user_id}:{key}")
}

pub const REAPER_LEADER_LOCK: &str = "lock:cron:reservations-cleanup";

/// Normalizes a client-supplied idempotency key per SPEC_FULL.md §4.2:
/// trimmed, truncated to 128 chars, empty collapses to `None`.
pub fn normalize_idempotency_key(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(128).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_lock_key_format() {
        assert_eq!(seat_lock("s1"), "lock:seat:s1");
    }

    #[test]
    fn idempotency_key_format() {
        assert_eq!(idempotency("u1", "demo-1"), "idem:reservation:u1:demo-1");
    }

    #[test]
    fn normalize_trims_and_drops_empty() {
        assert_eq!(normalize_idempotency_key(Some("  demo-1  ")).as_deref(), Some("demo-1"));
        assert_eq!(normalize_idempotency_key(Some("   ")), None);
        assert_eq!(normalize_idempotency_key(None), None);
    }

    #[test]
    fn normalize_truncates_to_128_chars() {
        let long = "a".repeat(200);
        let got = normalize_idempotency_key(Some(&long)).unwrap();
        assert_eq!(got.len(), 128);
    }
}
