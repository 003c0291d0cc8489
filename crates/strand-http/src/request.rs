//! HTTP request model.

use bytes::Bytes;

use crate::headers::Headers;
use crate::url::Url;
use crate::{HttpError, Result};

/// A complete decoded request.
///
/// Immutable once constructed from wire data. The stream id is meaningful
/// only under HTTP/2; HTTP/1.1 requests carry the 0 sentinel.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    stream_id: u32,
    method: String,
    url: Url,
    headers: Headers,
    payload: Bytes,
}

impl HttpRequest {
    /// Builds a request from decoded wire data, parsing the raw URL.
    pub fn new(
        stream_id: u32,
        method: impl Into<String>,
        raw_url: &str,
        headers: Headers,
        payload: Bytes,
    ) -> Result<Self> {
        Ok(Self {
            stream_id,
            method: method.into(),
            url: Url::parse(raw_url)?,
            headers,
            payload,
        })
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Declared body length. Absent means 0; a malformed value is a hard
    /// request error.
    pub fn content_length(&self) -> Result<usize> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::BadFormat(format!("bad content-length: {v}"))),
        }
    }

    /// Whether the connection should be closed after responding.
    ///
    /// Anything other than an explicit `keep-alive` closes.
    pub fn close_connection(&self) -> bool {
        match self.headers.get("connection") {
            Some(v) => !v.eq_ignore_ascii_case("keep-alive"),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: Headers) -> HttpRequest {
        HttpRequest::new(0, "GET", "/x", headers, Bytes::new()).unwrap()
    }

    #[test]
    fn test_content_length_absent_is_zero() {
        assert_eq!(request(Headers::new()).content_length().unwrap(), 0);
    }

    #[test]
    fn test_content_length_parsed() {
        let mut headers = Headers::new();
        headers.set("Content-Length", "42");
        assert_eq!(request(headers).content_length().unwrap(), 42);
    }

    #[test]
    fn test_content_length_malformed() {
        let mut headers = Headers::new();
        headers.set("content-length", "banana");
        assert!(matches!(
            request(headers).content_length(),
            Err(HttpError::BadFormat(_))
        ));
    }

    #[test]
    fn test_close_connection() {
        assert!(request(Headers::new()).close_connection());

        let mut keep = Headers::new();
        keep.set("Connection", "Keep-Alive");
        assert!(!request(keep).close_connection());

        let mut close = Headers::new();
        close.set("connection", "close");
        assert!(request(close).close_connection());
    }

    #[test]
    fn test_url_is_parsed() {
        let req = HttpRequest::new(3, "GET", "/a/b?x=1", Headers::new(), Bytes::new()).unwrap();
        assert_eq!(req.stream_id(), 3);
        assert_eq!(req.url().path(), "/a/b/");
        assert_eq!(req.url().parameter("x"), Some("1"));
    }
}
