use http::{HeaderMap, Method, Uri};
use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    time::Instant,
};

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Per-request throttling identity. Recomputed on every request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// First `x-forwarded-for` entry, else the peer address, else a shared
    /// sentinel. Every unidentifiable caller therefore shares one counter.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(first) = forwarded {
            return Self::new(first);
        }

        match peer {
            Some(addr) => Self::new(addr.ip().to_string()),
            None => Self::new(UNKNOWN_CLIENT),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub client: ClientIdentity,
    pub started_at: Instant,
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        method: Method,
        uri: Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            request_id,
            method,
            uri,
            client: ClientIdentity::resolve(headers, peer),
            started_at: Instant::now(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.5:43210".parse().unwrap())
    }

    #[test]
    fn picks_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1, 10.0.0.2"),
        );

        assert_eq!(ClientIdentity::resolve(&headers, peer()).as_str(), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));

        assert_eq!(ClientIdentity::resolve(&headers, peer()).as_str(), "192.0.2.5");
        assert_eq!(
            ClientIdentity::resolve(&HeaderMap::new(), peer()).as_str(),
            "192.0.2.5"
        );
    }

    #[test]
    fn unidentifiable_callers_share_sentinel() {
        let a = ClientIdentity::resolve(&HeaderMap::new(), None);
        let b = ClientIdentity::resolve(&HeaderMap::new(), None);
        assert_eq!(a.as_str(), UNKNOWN_CLIENT);
        assert_eq!(a, b);
    }
}
