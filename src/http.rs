//! The parsed-request / handler-produced-response value types (spec.md §3).

use std::collections::HashMap;

use crate::method::Method;

/// A fully parsed HTTP/1.1 request, handed to the resolved handler.
///
/// Header and query lookups are case-sensitive in the core (spec.md §4.3);
/// callers needing case-insensitive lookup (e.g. `Connection`) iterate
/// themselves; see [`RequestData::header_ci`].
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub method: Option<Method>,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    /// Captured `*` segments, left-to-right, one per wildcard in the
    /// matched route.
    pub url_variables: Vec<String>,
    pub body: Vec<u8>,
}

impl RequestData {
    pub fn new(method: Method) -> Self {
        Self {
            method: Some(method),
            headers: HashMap::new(),
            query: HashMap::new(),
            url_variables: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Case-insensitive header lookup: lower-cases both the stored name and
    /// `name`, and returns the lower-cased, trimmed value. Used only where
    /// the spec explicitly requires it (the `Connection` header).
    pub fn header_ci(&self, name: &str) -> Option<String> {
        let needle = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == needle)
            .map(|(_, v)| v.trim().to_ascii_lowercase())
    }
}

/// A handler-produced response (spec.md §3). `status` must be in `[100, 599]`;
/// handlers are trusted to respect this, the core does not clamp it.
#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ResponseData {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Frames this response onto the wire exactly as spec.md §6 prescribes:
    /// status line, `Content-Length` only if the handler didn't set one,
    /// `Connection` always set by the server (overriding any handler value),
    /// then the handler's other headers verbatim, then the body.
    ///
    /// Grounded in the teacher's inline formatting in `worker.rs`
    /// (`write!(cursor, "HTTP/1.1 {} OK\r\n..."`), generalized to the
    /// OK/ERROR reason-phrase rule and the Content-Length-iff-absent rule
    /// spec.md §6 actually specifies (the teacher always writes `OK` and
    /// always overwrites Content-Length).
    pub fn framed(&self, keep_alive: bool) -> Vec<u8> {
        let reason = if self.status / 100 == 2 { "OK" } else { "ERROR" };
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, reason).as_bytes());

        if !self.headers.contains_key("Content-Length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "Connection: {}\r\n",
                if keep_alive { "keep-alive" } else { "close" }
            )
            .as_bytes(),
        );
        for (name, value) in &self.headers {
            if name == "Connection" {
                continue;
            }
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// A pure function from request to response. Must not suspend; a handler
/// that panics is caught by the request task and mapped to 500 (spec.md §4.4).
pub type Handler = std::sync::Arc<dyn Fn(RequestData) -> ResponseData + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_ci_matches_regardless_of_case() {
        let mut req = RequestData::new(Method::Get);
        req.headers
            .insert("Connection".to_string(), " Keep-Alive ".to_string());
        assert_eq!(req.header_ci("connection"), Some("keep-alive".to_string()));
        assert_eq!(req.header_ci("CONNECTION"), Some("keep-alive".to_string()));
    }

    #[test]
    fn header_ci_absent_is_none() {
        let req = RequestData::new(Method::Get);
        assert_eq!(req.header_ci("connection"), None);
    }

    #[test]
    fn framing_inserts_content_length_when_absent() {
        let resp = ResponseData::with_body(200, b"hello".to_vec());
        let wire = resp.framed(true);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn framing_preserves_handler_supplied_content_length() {
        let resp = ResponseData::with_body(200, b"hello".to_vec()).header("Content-Length", "999");
        let text = String::from_utf8(resp.framed(true)).unwrap();
        assert!(text.contains("Content-Length: 999\r\n"));
        assert!(!text.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn framing_overrides_handler_supplied_connection_header() {
        let resp = ResponseData::new(200).header("Connection", "keep-alive");
        let text = String::from_utf8(resp.framed(false)).unwrap();
        assert!(text.contains("Connection: close\r\n"));
        assert_eq!(text.matches("Connection:").count(), 1);
    }

    #[test]
    fn non_2xx_status_uses_error_reason_phrase() {
        let resp = ResponseData::new(404);
        let text = String::from_utf8(resp.framed(false)).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 ERROR\r\n"));
    }
}
