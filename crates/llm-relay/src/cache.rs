// Thought-signature continuity cache.
//
// Gemini requires the last assistant message that opened a reasoning block
// to carry a matching signature on every later turn, and clients commonly
// strip custom fields. The cache keeps the last valid signature per
// session so emitters can reinstate it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Signature value that bypasses validation on the provider side.
pub const SKIP_THOUGHT_SIGNATURE_VALIDATOR: &str = "skip_thought_signature_validator";

const SIGNATURE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const MIN_SIGNATURE_LENGTH: usize = 50;

struct Entry {
    signature: String,
    expires_at: Instant,
}

static CACHE: RwLock<Option<HashMap<String, Entry>>> = RwLock::new(None);

/// Store the latest valid signature for a session. Writes are ignored for
/// empty keys and for signatures that are neither the sentinel nor at
/// least 50 characters.
pub fn cache_session_thought_signature(session_id: &str, signature: &str) {
    let session_id = session_id.trim();
    let signature = signature.trim();
    if session_id.is_empty() || signature.is_empty() {
        return;
    }
    if signature != SKIP_THOUGHT_SIGNATURE_VALIDATOR && signature.len() < MIN_SIGNATURE_LENGTH {
        return;
    }
    let mut guard = CACHE.write().unwrap_or_else(|e| e.into_inner());
    guard.get_or_insert_with(HashMap::new).insert(
        session_id.to_string(),
        Entry {
            signature: signature.to_string(),
            expires_at: Instant::now() + SIGNATURE_TTL,
        },
    );
}

/// The stored signature for a session, or empty. Expired entries are
/// deleted on read.
pub fn get_session_thought_signature(session_id: &str) -> String {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return String::new();
    }

    {
        let guard = CACHE.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref().and_then(|m| m.get(session_id)) {
            Some(entry) if Instant::now() <= entry.expires_at => {
                return entry.signature.clone();
            }
            Some(_) => {}
            None => return String::new(),
        }
    }

    // Expired: drop the entry under the write lock.
    let mut guard = CACHE.write().unwrap_or_else(|e| e.into_inner());
    if let Some(map) = guard.as_mut() {
        if map
            .get(session_id)
            .map(|e| Instant::now() > e.expires_at)
            .unwrap_or(false)
        {
            map.remove(session_id);
        }
    }
    String::new()
}

/// Whether a signature would be accepted by the provider: the sentinel
/// always passes, empty never does, anything else needs >= 50 chars.
pub fn has_valid_signature(_model: &str, signature: &str) -> bool {
    let signature = signature.trim();
    if signature.is_empty() {
        return false;
    }
    if signature == SKIP_THOUGHT_SIGNATURE_VALIDATOR {
        return true;
    }
    signature.len() >= MIN_SIGNATURE_LENGTH
}

/// Drop every cached signature. Test hook.
pub fn clear_session_thought_signature_cache() {
    let mut guard = CACHE.write().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_sig() -> String {
        "s".repeat(MIN_SIGNATURE_LENGTH)
    }

    #[test]
    fn test_has_valid_signature() {
        assert!(!has_valid_signature("", ""));
        assert!(has_valid_signature("", SKIP_THOUGHT_SIGNATURE_VALIDATOR));
        assert!(!has_valid_signature("", "short"));
        assert!(has_valid_signature("", &long_sig()));
        assert!(!has_valid_signature("", &"s".repeat(MIN_SIGNATURE_LENGTH - 1)));
    }

    #[test]
    fn test_store_and_read() {
        let sig = long_sig();
        cache_session_thought_signature("sess-store", &sig);
        assert_eq!(get_session_thought_signature("sess-store"), sig);
        assert_eq!(get_session_thought_signature("sess-other"), "");
    }

    #[test]
    fn test_short_signature_rejected() {
        cache_session_thought_signature("sess-short", "tiny");
        assert_eq!(get_session_thought_signature("sess-short"), "");
    }

    #[test]
    fn test_sentinel_accepted() {
        cache_session_thought_signature("sess-sentinel", SKIP_THOUGHT_SIGNATURE_VALIDATOR);
        assert_eq!(
            get_session_thought_signature("sess-sentinel"),
            SKIP_THOUGHT_SIGNATURE_VALIDATOR
        );
    }

    #[test]
    fn test_last_write_wins() {
        let first = "a".repeat(MIN_SIGNATURE_LENGTH);
        let second = "b".repeat(MIN_SIGNATURE_LENGTH);
        cache_session_thought_signature("sess-order", &first);
        cache_session_thought_signature("sess-order", &second);
        assert_eq!(get_session_thought_signature("sess-order"), second);
    }
}
