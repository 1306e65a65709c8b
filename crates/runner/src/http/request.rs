//! Request construction

use wafreplay_common::Header;

/// `METHOD URI VERSION`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: String,
}

impl RequestLine {
    pub fn new(method: impl Into<String>, uri: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.method, self.uri, self.version)
    }
}

#[derive(Debug, Clone)]
enum RequestKind {
    Structured {
        line: RequestLine,
        headers: Header,
        body: Option<Vec<u8>>,
    },
    Raw(Vec<u8>),
}

/// A request ready to be written to a connection
#[derive(Debug, Clone)]
pub struct Request {
    kind: RequestKind,
    autocomplete_headers: bool,
}

impl Request {
    /// Structured request. With `autocomplete_headers` a missing
    /// `Content-Length` is added for non-empty bodies.
    pub fn new(
        line: RequestLine,
        headers: Header,
        body: Option<Vec<u8>>,
        autocomplete_headers: bool,
    ) -> Self {
        Self {
            kind: RequestKind::Structured {
                line,
                headers,
                body,
            },
            autocomplete_headers,
        }
    }

    /// Request sent verbatim
    pub fn raw(bytes: Vec<u8>, autocomplete_headers: bool) -> Self {
        Self {
            kind: RequestKind::Raw(bytes),
            autocomplete_headers,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.kind, RequestKind::Raw(_))
    }

    pub fn autocomplete_headers(&self) -> bool {
        self.autocomplete_headers
    }

    pub fn headers(&self) -> Option<&Header> {
        match &self.kind {
            RequestKind::Structured { headers, .. } => Some(headers),
            RequestKind::Raw(_) => None,
        }
    }

    pub fn line(&self) -> Option<&RequestLine> {
        match &self.kind {
            RequestKind::Structured { line, .. } => Some(line),
            RequestKind::Raw(_) => None,
        }
    }

    /// Whether the response to this request carries no body
    pub fn is_head(&self) -> bool {
        match &self.kind {
            RequestKind::Structured { line, .. } => line.method.eq_ignore_ascii_case("HEAD"),
            RequestKind::Raw(bytes) => bytes.len() >= 5 && bytes[..5].eq_ignore_ascii_case(b"HEAD "),
        }
    }

    /// Wire representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.kind {
            RequestKind::Raw(bytes) => bytes.clone(),
            RequestKind::Structured {
                line,
                headers,
                body,
            } => {
                let body = body.as_deref().unwrap_or_default();
                let mut headers = headers.clone();
                if self.autocomplete_headers && !body.is_empty() && !headers.contains("Content-Length") {
                    headers.add("Content-Length", body.len().to_string());
                }

                let mut buf = Vec::with_capacity(64 + body.len());
                buf.extend_from_slice(line.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                headers.write_to(&mut buf);
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(body);
                buf
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_line() -> RequestLine {
        RequestLine::new("POST", "/post", "HTTP/1.1")
    }

    #[test]
    fn test_autocomplete_adds_content_length() {
        let headers: Header = [("Host", "localhost")].into_iter().collect();
        let req = Request::new(post_line(), headers, Some(b"a=1&b=2".to_vec()), true);
        let wire = String::from_utf8(req.to_bytes()).unwrap();
        assert_eq!(
            wire,
            "POST /post HTTP/1.1\r\nHost: localhost\r\nContent-Length: 7\r\n\r\na=1&b=2"
        );
    }

    #[test]
    fn test_stop_magic_leaves_headers_alone() {
        let headers: Header = [("Host", "localhost")].into_iter().collect();
        let req = Request::new(post_line(), headers, Some(b"a=1".to_vec()), false);
        let wire = String::from_utf8(req.to_bytes()).unwrap();
        assert!(!wire.contains("Content-Length"));
    }

    #[test]
    fn test_existing_content_length_is_kept() {
        let headers: Header = [("Content-Length", "99")].into_iter().collect();
        let req = Request::new(post_line(), headers, Some(b"abc".to_vec()), true);
        let wire = String::from_utf8(req.to_bytes()).unwrap();
        assert_eq!(wire.matches("Content-Length").count(), 1);
        assert!(wire.contains("Content-Length: 99"));
    }

    #[test]
    fn test_raw_request_is_verbatim() {
        let raw = b"GET /?x=<script> HTTP/1.0\n\n".to_vec();
        let req = Request::raw(raw.clone(), true);
        assert!(req.is_raw());
        assert_eq!(req.to_bytes(), raw);
        assert!(req.headers().is_none());
    }

    #[test]
    fn test_head_detection() {
        let head = Request::new(RequestLine::new("HEAD", "/", "HTTP/1.1"), Header::new(), None, true);
        assert!(head.is_head());
        assert!(Request::raw(b"head / HTTP/1.1\r\n\r\n".to_vec(), false).is_head());
        assert!(!Request::raw(b"GET / HTTP/1.1\r\n\r\n".to_vec(), false).is_head());
    }
}
