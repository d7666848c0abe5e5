//! Trace-context propagation through message headers.
//!
//! Handlers at every boundary reuse the incoming trace id and re-inject it
//! into everything they publish, so one measurement can be followed from
//! REST request to agent handler to persisted result.

use crate::HeaderMap;

/// Header key carrying the trace id.
pub const TRACE_ID: &str = "imn-trace-id";

/// Trace id from headers, if present.
pub fn extract(headers: &HeaderMap) -> Option<&str> {
    headers.get(TRACE_ID).map(String::as_str)
}

/// Ensure headers carry a trace id, minting one if absent. Returns the id
/// in effect.
pub fn ensure(headers: &mut HeaderMap) -> String {
    if let Some(existing) = headers.get(TRACE_ID) {
        return existing.clone();
    }
    let id = uuid::Uuid::new_v4().to_string();
    headers.insert(TRACE_ID.to_string(), id.clone());
    id
}

/// Copy the trace id from one header map into another.
pub fn propagate(from: &HeaderMap, into: &mut HeaderMap) {
    if let Some(id) = extract(from) {
        into.insert(TRACE_ID.to_string(), id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_mints_once() {
        let mut headers = HeaderMap::new();
        let id = ensure(&mut headers);
        assert_eq!(ensure(&mut headers), id);
        assert_eq!(extract(&headers), Some(id.as_str()));
    }

    #[test]
    fn propagate_copies_id() {
        let mut from = HeaderMap::new();
        let id = ensure(&mut from);

        let mut into = HeaderMap::new();
        propagate(&from, &mut into);
        assert_eq!(extract(&into), Some(id.as_str()));
    }

    #[test]
    fn propagate_without_id_is_noop() {
        let from = HeaderMap::new();
        let mut into = HeaderMap::new();
        propagate(&from, &mut into);
        assert!(into.is_empty());
    }
}
