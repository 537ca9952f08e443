//! The response container and its view.

use std::fmt;
use std::str;

use http::{StatusCode, Version};

use crate::fields::{impl_field_ops, sealed::HasStore, FieldsView, Headers};
use crate::metadata::{Kind, Payload};
use crate::request::set_keep_alive_tokens;
use crate::store::Store;
use crate::{Error, Result};

/// A mutable HTTP response header.
///
/// Owns one allocation holding the serialized status-line and fields.
/// Defaults to `HTTP/1.1 200 OK`. Every mutation keeps the serialized
/// bytes and the [`crate::Metadata`] summaries current.
#[derive(Clone)]
pub struct Response {
    store: Store,
}

impl Response {
    pub fn new() -> Response {
        Response {
            store: Store::new(Kind::Response),
        }
    }

    /// Parse a complete serialized response header, status-line through
    /// the final blank line.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut r = Response::new();
        let n = r.store.parse_block(input)?;
        if n != input.len() {
            return Err(Error::BadFieldName);
        }
        Ok(r)
    }

    pub fn view(&self) -> ResponseView<'_> {
        ResponseView { store: &self.store }
    }

    /// A view of just the field area.
    pub fn fields(&self) -> FieldsView<'_> {
        FieldsView::new(&self.store)
    }

    pub fn status(&self) -> StatusCode {
        self.store.status()
    }

    pub fn reason(&self) -> &str {
        // reasons are validated UTF-8 on parse and set
        str::from_utf8(self.store.reason()).expect("utf-8 reason phrase")
    }

    pub fn version(&self) -> Version {
        self.store.version()
    }

    /// Set the status code, with its canonical reason phrase.
    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        let version = self.store.version();
        let reason = status.canonical_reason().unwrap_or("");
        self.store.set_status_line(status, reason.as_bytes(), version)
    }

    /// Set the reason phrase, keeping the status code.
    pub fn set_reason(&mut self, reason: &str) -> Result<()> {
        let status = self.store.status();
        let version = self.store.version();
        self.store.set_status_line(status, reason.as_bytes(), version)
    }

    pub fn set_version(&mut self, version: Version) -> Result<()> {
        let status = self.store.status();
        let reason: Vec<u8> = self.store.reason().to_vec();
        self.store.set_status_line(status, &reason, version)
    }

    /// Set the whole status-line at once.
    pub fn set_start_line(
        &mut self,
        status: StatusCode,
        reason: &str,
        version: Version,
    ) -> Result<()> {
        self.store.set_status_line(status, reason.as_bytes(), version)
    }

    /// The derived payload classification for this response.
    pub fn payload(&self) -> Payload {
        self.store.metadata().payload
    }

    /// Whether the connection can be reused after this response.
    pub fn keep_alive(&self) -> bool {
        let env = self.store.env();
        self.store.metadata().keep_alive(env)
    }

    /// Replace any framing headers with `Content-Length: n`.
    pub fn set_content_length(&mut self, n: u64) -> Result<()> {
        self.store.remove_all(b"transfer-encoding");
        self.store.set(b"Content-Length", n.to_string().as_bytes())
    }

    /// Switch chunked framing on or off.
    ///
    /// Turning it on replaces any existing `Transfer-Encoding` and
    /// removes `Content-Length`.
    pub fn set_chunked(&mut self, chunked: bool) -> Result<()> {
        if chunked {
            self.store.remove_all(b"content-length");
            self.store.set(b"Transfer-Encoding", b"chunked")
        } else {
            self.store.remove_all(b"transfer-encoding");
            Ok(())
        }
    }

    /// Adjust the `Connection` tokens so the message asks for the
    /// connection to stay open (or not) under its HTTP version.
    pub fn set_keep_alive(&mut self, keep_alive: bool) -> Result<()> {
        set_keep_alive_tokens(&mut self.store, keep_alive)
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

impl Default for Response {
    fn default() -> Self {
        Response::new()
    }
}

impl HasStore for Response {
    fn store(&self) -> &Store {
        &self.store
    }
}

impl Headers for Response {}

impl_field_ops!(Response);

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("version", &self.version())
            .field("fields", &self.len())
            .finish()
    }
}

/// Non-owning read view of a [`Response`].
#[derive(Clone, Copy)]
pub struct ResponseView<'a> {
    store: &'a Store,
}

impl<'a> ResponseView<'a> {
    pub(crate) fn new(store: &'a Store) -> ResponseView<'a> {
        ResponseView { store }
    }

    pub fn status(&self) -> StatusCode {
        self.store.status()
    }

    pub fn reason(&self) -> &'a str {
        // reasons are validated UTF-8 on parse and set
        str::from_utf8(self.store.reason()).expect("utf-8 reason phrase")
    }

    pub fn version(&self) -> Version {
        self.store.version()
    }

    pub fn payload(&self) -> Payload {
        self.store.metadata().payload
    }

    pub fn keep_alive(&self) -> bool {
        self.store.metadata().keep_alive(self.store.env())
    }

    pub fn fields(&self) -> FieldsView<'a> {
        FieldsView::new(self.store)
    }
}

impl HasStore for ResponseView<'_> {
    fn store(&self) -> &Store {
        self.store
    }
}

impl Headers for ResponseView<'_> {}

impl fmt::Debug for ResponseView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseView")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_status_line() {
        let r = Response::new();
        assert_eq!(r.as_bytes(), b"HTTP/1.1 200 OK\r\n\r\n" as &[u8]);
        assert_eq!(r.status(), StatusCode::OK);
        assert_eq!(r.reason(), "OK");
    }

    #[test]
    fn status_setters() {
        let mut r = Response::new();
        r.append("Server", "p").unwrap();
        r.set_status(StatusCode::NOT_FOUND).unwrap();
        assert_eq!(r.as_bytes(), b"HTTP/1.1 404 Not Found\r\nServer: p\r\n\r\n" as &[u8]);
        r.set_reason("Gone Fishing").unwrap();
        assert_eq!(r.as_bytes(), b"HTTP/1.1 404 Gone Fishing\r\nServer: p\r\n\r\n" as &[u8]);
    }

    #[test]
    fn close_and_zero_length() {
        // HTTP/1.1 200 with Content-Length: 0 and Connection: close
        let mut r = Response::new();
        r.set_content_length(0).unwrap();
        r.append("Connection", "close").unwrap();
        assert_eq!(r.payload(), Payload::None);
        assert!(!r.keep_alive());
    }

    #[test]
    fn to_eof_when_unframed() {
        let r = Response::new();
        assert_eq!(r.payload(), Payload::ToEof);
        assert!(!r.keep_alive());
    }

    #[test]
    fn no_body_statuses() {
        let mut r = Response::new();
        r.set_content_length(10).unwrap();
        r.set_status(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(r.payload(), Payload::None);
        r.set_status(StatusCode::CONTINUE).unwrap();
        assert_eq!(r.payload(), Payload::None);
        r.set_status(StatusCode::OK).unwrap();
        assert_eq!(r.payload(), Payload::Size(10));
    }

    #[test]
    fn erase_all_transfer_encoding() {
        let mut r = Request::parse(
            b"GET / HTTP/1.1\r\nTransfer-Encoding: gzip\r\nTransfer-Encoding: compress\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
        assert_eq!(r.remove_all("Transfer-Encoding"), 3);
        assert_eq!(r.payload(), Payload::None);
        assert_eq!(r.metadata().transfer_encoding.count, 0);
        assert!(!r.metadata().transfer_encoding.is_chunked);
    }

    use crate::Request;

    #[test]
    fn self_aliased_set() {
        // copying a value out of the store and setting it elsewhere in
        // the same store, growing and non-growing
        let mut f = crate::Fields::new();
        f.append("A", "aaaa").unwrap();
        f.append("B", "b").unwrap();
        let aliased = f.get("A").unwrap().to_vec();
        f.set_value(1, &aliased).unwrap();
        assert_eq!(f.as_bytes(), b"A: aaaa\r\nB: aaaa\r\n\r\n" as &[u8]);

        let long = "x".repeat(200);
        f.set_value(0, &long).unwrap();
        let aliased = f.get("A").unwrap().to_vec();
        f.set_value(1, &aliased).unwrap();
        assert_eq!(f.get("B").unwrap(), long.as_bytes());
    }
}
