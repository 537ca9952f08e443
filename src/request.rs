//! The request container and its view.

use std::fmt;
use std::str;

use http::{Method, Version};

use crate::fields::{impl_field_ops, sealed::HasStore, FieldsView, Headers};
use crate::metadata::{Kind, Payload};
use crate::store::Store;
use crate::{Error, Result};

/// A mutable HTTP request header.
///
/// Owns one allocation holding the serialized request-line and fields.
/// Defaults to `GET / HTTP/1.1`. Every mutation keeps the serialized
/// bytes and the [`crate::Metadata`] summaries current.
#[derive(Clone)]
pub struct Request {
    store: Store,
}

impl Request {
    pub fn new() -> Request {
        Request {
            store: Store::new(Kind::Request),
        }
    }

    /// Parse a complete serialized request header, request-line through
    /// the final blank line.
    pub fn parse(input: &[u8]) -> Result<Request> {
        let mut r = Request::new();
        let n = r.store.parse_block(input)?;
        if n != input.len() {
            return Err(Error::BadFieldName);
        }
        Ok(r)
    }

    pub fn view(&self) -> RequestView<'_> {
        RequestView { store: &self.store }
    }

    /// A view of just the field area.
    pub fn fields(&self) -> FieldsView<'_> {
        FieldsView::new(&self.store)
    }

    pub fn method(&self) -> &Method {
        self.store.method()
    }

    pub fn target(&self) -> &str {
        // targets are validated ascii-graphic on parse and set
        str::from_utf8(self.store.target()).expect("ascii request target")
    }

    pub fn version(&self) -> Version {
        self.store.version()
    }

    pub fn set_method(&mut self, method: Method) -> Result<()> {
        let target: Vec<u8> = self.store.target().to_vec();
        let version = self.store.version();
        self.store.set_request_line(method, &target, version)
    }

    pub fn set_target(&mut self, target: &str) -> Result<()> {
        let method = self.store.method().clone();
        let version = self.store.version();
        self.store.set_request_line(method, target.as_bytes(), version)
    }

    pub fn set_version(&mut self, version: Version) -> Result<()> {
        let method = self.store.method().clone();
        let target: Vec<u8> = self.store.target().to_vec();
        self.store.set_request_line(method, &target, version)
    }

    /// Set the whole request-line at once.
    pub fn set_start_line(&mut self, method: Method, target: &str, version: Version) -> Result<()> {
        self.store.set_request_line(method, target.as_bytes(), version)
    }

    /// The derived payload classification for this request.
    pub fn payload(&self) -> Payload {
        self.store.metadata().payload
    }

    /// Whether the connection can be reused after this request.
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

    pub(crate) fn store_ref(&self) -> &Store {
        &self.store
    }
}

impl Default for Request {
    fn default() -> Self {
        Request::new()
    }
}

impl HasStore for Request {
    fn store(&self) -> &Store {
        &self.store
    }
}

impl Headers for Request {}

impl_field_ops!(Request);

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("target", &self.target())
            .field("version", &self.version())
            .field("fields", &self.len())
            .finish()
    }
}

/// Non-owning read view of a [`Request`].
#[derive(Clone, Copy)]
pub struct RequestView<'a> {
    store: &'a Store,
}

impl<'a> RequestView<'a> {
    pub(crate) fn new(store: &'a Store) -> RequestView<'a> {
        RequestView { store }
    }

    pub fn method(&self) -> &'a Method {
        self.store.method()
    }

    pub fn target(&self) -> &'a str {
        // targets are validated ascii-graphic on parse and set
        str::from_utf8(self.store.target()).expect("ascii request target")
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

impl HasStore for RequestView<'_> {
    fn store(&self) -> &Store {
        self.store
    }
}

impl Headers for RequestView<'_> {}

impl fmt::Debug for RequestView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestView")
            .field("method", self.method())
            .field("target", &self.target())
            .finish()
    }
}

/// Rebuild the `Connection` token list for the wanted keep-alive state.
pub(crate) fn set_keep_alive_tokens(store: &mut Store, keep_alive: bool) -> Result<()> {
    let mut tokens: Vec<String> = Vec::new();
    let mut i = 0;
    while i < store.count() {
        if store.name_bytes(i).eq_ignore_ascii_case(b"connection") {
            let value = store.value_bytes(i).to_vec();
            for t in crate::grammar::list(&value) {
                let t = String::from_utf8_lossy(t).to_ascii_lowercase();
                if !tokens.contains(&t) {
                    tokens.push(t);
                }
            }
        }
        i += 1;
    }

    let http10 = store.version() == Version::HTTP_10;
    if http10 {
        // http/1.0 closes unless keep-alive is announced
        toggle(&mut tokens, "keep-alive", keep_alive);
        toggle(&mut tokens, "close", false);
    } else {
        toggle(&mut tokens, "close", !keep_alive);
        toggle(&mut tokens, "keep-alive", false);
    }

    if tokens.is_empty() {
        store.remove_all(b"connection");
        Ok(())
    } else {
        store.set(b"Connection", tokens.join(", ").as_bytes())
    }
}

fn toggle(tokens: &mut Vec<String>, token: &str, wanted: bool) {
    let present = tokens.iter().any(|t| t == token);
    if wanted && !present {
        tokens.push(token.to_string());
    } else if !wanted && present {
        tokens.retain(|t| t != token);
    }
}
