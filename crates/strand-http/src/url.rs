//! URL parsing for request targets.
//!
//! Only the shape the server actually receives is supported: an absolute
//! path, optionally followed by `?name=value&name=value`. Paths are held to
//! a strict character allow-list; query names and values are
//! percent-decoded.

use std::collections::BTreeMap;

use thiserror::Error;

/// URL parse error. Always a hard request error (400).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    #[error("badly formed path: {0}")]
    UnsafePath(String),

    #[error("badly formed query parameter: {0}")]
    BadParameter(String),

    #[error("badly encoded escape in: {0}")]
    BadEscape(String),
}

/// A parsed request target.
///
/// Parsing is pure: the same raw string always yields the same path and
/// parameter map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    raw: String,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl Url {
    /// Parses a request target of the form `/path` or `/path?a=1&b=2`.
    ///
    /// When a query is present and the path does not already end in `/`,
    /// a trailing `/` is appended before validation. Every query component
    /// must contain exactly one `=`.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let (mut path, query) = match raw.find('?') {
            None => (raw.to_string(), None),
            Some(p) => (raw[..p].to_string(), Some(&raw[p + 1..])),
        };

        if query.is_some() && !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }

        if !path_is_safe(&path) {
            return Err(UrlError::UnsafePath(path));
        }
        let path = percent_decode(&path)?;

        let mut parameters = BTreeMap::new();
        if let Some(query) = query {
            if !query.is_empty() {
                for component in query.split('&') {
                    let mut parts = component.split('=');
                    match (parts.next(), parts.next(), parts.next()) {
                        (Some(name), Some(value), None) => {
                            parameters
                                .insert(percent_decode(name)?, percent_decode(value)?);
                        }
                        _ => return Err(UrlError::BadParameter(component.to_string())),
                    }
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            path,
            parameters,
        })
    }

    /// The decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw string the URL was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Looks up a decoded query parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// All decoded query parameters.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// Decodes `%XX` escapes.
fn percent_decode(s: &str) -> Result<String, UrlError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(UrlError::BadEscape(s.to_string()));
            }
            let hi = hex_value(bytes[i + 1]).ok_or_else(|| UrlError::BadEscape(s.to_string()))?;
            let lo = hex_value(bytes[i + 2]).ok_or_else(|| UrlError::BadEscape(s.to_string()))?;
            out.push(hi * 16 + lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| UrlError::BadEscape(s.to_string()))
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Checks a path against the character allow-list and rejects `..` and
/// `//` sequences.
fn path_is_safe(path: &str) -> bool {
    let bytes = path.as_bytes();
    for (i, &c) in bytes.iter().enumerate() {
        let allowed = c.is_ascii_alphanumeric()
            || c == b'/'
            || c == b'-'
            || c == b'_'
            || c == b'.';
        if !allowed {
            return false;
        }
        if i + 1 < bytes.len() {
            let next = bytes[i + 1];
            if c == next && (c == b'/' || c == b'.') {
                return false;
            }
        }
    }
    true
}
