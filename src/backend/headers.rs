//! Caller header forwarding policy
//!
//! Every caller-supplied header is passed through to the backend except a
//! fixed reserved set, and a forwarded header never overrides one the
//! broker sets itself (content type, accept, bearer authorization).

use axum::http::HeaderMap;

/// Headers never forwarded to a backend, matched case-insensitively
pub const RESERVED_HEADERS: [&str; 8] = [
    "content-length",
    "authorization",
    "connection",
    "host",
    "accept-encoding",
    "proxy-authenticate",
    "proxy-authorization",
    "www-authenticate",
];

/// Drop the reserved headers from a caller's request headers
#[must_use]
pub fn filter_reserved(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for name in headers.keys() {
        // HeaderName is already lowercase.
        if RESERVED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        for value in headers.get_all(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Append forwarded headers into `target` without overriding existing ones
pub fn merge_forwarded(target: &mut HeaderMap, extra: &HeaderMap) {
    for name in extra.keys() {
        if target.contains_key(name) {
            continue;
        }
        for value in extra.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST};

    #[test]
    fn reserved_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        headers.insert(HOST, "rp.example.com".parse().unwrap());
        headers.insert("x-custom", "v".parse().unwrap());

        let filtered = filter_reserved(&headers);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("x-custom").unwrap(), "v");
    }

    #[test]
    fn multi_valued_headers_survive_filtering() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", "a".parse().unwrap());
        headers.append("x-tag", "b".parse().unwrap());

        let filtered = filter_reserved(&headers);
        let values: Vec<_> = filtered.get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn forwarded_headers_never_override_broker_headers() {
        let mut target = HeaderMap::new();
        target.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        target.insert(ACCEPT, "application/json".parse().unwrap());

        let mut extra = HeaderMap::new();
        extra.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        extra.insert("username", "john@citizen.com".parse().unwrap());

        merge_forwarded(&mut target, &extra);

        assert_eq!(target.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(target.get("username").unwrap(), "john@citizen.com");
    }
}
