use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier used for upstream chat/message ids.
#[must_use]
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Client-facing completion id, one per emitted chunk or response.
#[must_use]
pub(crate) fn chat_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

/// Fallback tool-call id when upstream metadata omits one.
#[must_use]
pub(crate) fn tool_call_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    format!("call_{}", &id[..10])
}

#[inline]
pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs() as i64)
}

#[inline]
pub(crate) fn unix_now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_expected_prefixes() {
        assert!(chat_completion_id().starts_with("chatcmpl-"));
        let call = tool_call_id();
        assert!(call.starts_with("call_"));
        assert_eq!(call.len(), "call_".len() + 10);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn clock_is_monotonic_enough() {
        let secs = unix_now_secs();
        let millis = unix_now_millis();
        assert!(secs > 1_600_000_000);
        assert!(millis / 1000 >= secs - 1);
    }
}
