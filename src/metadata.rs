//! Incrementally maintained header semantics.
//!
//! Every insert and erase on a header container flows through the hooks
//! in this module, so the summaries are always current without scanning
//! the whole container. Only erasing one of several fields of the same
//! name triggers a re-scan, and that re-scan covers just the surviving
//! fields of that one name.

use http::Version;

use crate::grammar;
use crate::Error;

/// Identifies the header fields with tracked semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldId {
    Connection,
    ContentEncoding,
    ContentLength,
    Expect,
    TransferEncoding,
    Upgrade,
}

impl FieldId {
    pub fn from_name(name: &[u8]) -> Option<FieldId> {
        // lengths first, it disambiguates most of the set
        match name.len() {
            6 if grammar::ci_equal(name, "expect") => Some(FieldId::Expect),
            7 if grammar::ci_equal(name, "upgrade") => Some(FieldId::Upgrade),
            10 if grammar::ci_equal(name, "connection") => Some(FieldId::Connection),
            14 if grammar::ci_equal(name, "content-length") => Some(FieldId::ContentLength),
            16 if grammar::ci_equal(name, "content-encoding") => Some(FieldId::ContentEncoding),
            17 if grammar::ci_equal(name, "transfer-encoding") => Some(FieldId::TransferEncoding),
            _ => None,
        }
    }

    pub fn to_code(self) -> u16 {
        match self {
            FieldId::Connection => 0,
            FieldId::ContentEncoding => 1,
            FieldId::ContentLength => 2,
            FieldId::Expect => 3,
            FieldId::TransferEncoding => 4,
            FieldId::Upgrade => 5,
        }
    }

    pub fn from_code(code: u16) -> Option<FieldId> {
        match code {
            0 => Some(FieldId::Connection),
            1 => Some(FieldId::ContentEncoding),
            2 => Some(FieldId::ContentLength),
            3 => Some(FieldId::Expect),
            4 => Some(FieldId::TransferEncoding),
            5 => Some(FieldId::Upgrade),
            _ => None,
        }
    }
}

/// What kind of message the metadata belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Fields,
    Request,
    Response,
}

/// Start-line facts the hooks need to classify the payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Env {
    pub kind: Kind,
    pub version: Version,
    pub status: u16,
}

/// Summary of all `Connection` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Number of `Connection` fields present.
    pub count: u16,
    /// A `close` token is present.
    pub has_close: bool,
    /// A `keep-alive` token is present.
    pub has_keep_alive: bool,
    /// An `upgrade` token is present.
    pub has_upgrade: bool,
    /// Set when any `Connection` value failed to parse as a token list.
    pub error: Option<Error>,
}

/// Summary of all `Content-Length` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentLengthInfo {
    /// Number of `Content-Length` fields present.
    pub count: u16,
    /// The value, when `count > 0` and `error` is clear.
    pub value: u64,
    /// Set on unparsable or conflicting values.
    pub error: Option<Error>,
}

/// Summary of all `Expect` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectInfo {
    /// Number of `Expect` fields present.
    pub count: u16,
    /// The single permitted request value, `100-continue`, is present.
    pub is_100_continue: bool,
    /// Set on any other value, or on duplicates.
    pub error: Option<Error>,
}

/// Summary of all `Transfer-Encoding` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferEncodingInfo {
    /// Number of `Transfer-Encoding` fields present.
    pub count: u16,
    /// Total number of codings across all fields.
    pub codings: u16,
    /// `chunked` is present (last, exactly once).
    pub is_chunked: bool,
    /// A compression transfer-coding preceding `chunked`, if any.
    pub coding: ContentCoding,
    /// Set when `chunked` repeats or is not last, or a value is invalid.
    pub error: Option<Error>,
}

/// Summary of all `Upgrade` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeInfo {
    /// Number of `Upgrade` fields present.
    pub count: u16,
    /// A versionless `websocket` protocol is listed.
    pub websocket: bool,
    /// Set on invalid lists, or on any `Upgrade` under HTTP/1.0.
    pub error: Option<Error>,
}

/// A recognized content coding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentCoding {
    /// No transformation.
    #[default]
    Identity,
    /// zlib-framed deflate.
    Deflate,
    /// gzip.
    Gzip,
    /// brotli (`br`).
    Brotli,
    /// Anything this crate cannot decode.
    Unknown,
}

impl ContentCoding {
    fn from_token(t: &[u8]) -> ContentCoding {
        if grammar::ci_equal(t, "identity") {
            ContentCoding::Identity
        } else if grammar::ci_equal(t, "deflate") {
            ContentCoding::Deflate
        } else if grammar::ci_equal(t, "gzip") || grammar::ci_equal(t, "x-gzip") {
            ContentCoding::Gzip
        } else if grammar::ci_equal(t, "br") {
            ContentCoding::Brotli
        } else {
            ContentCoding::Unknown
        }
    }
}

/// How the message body is framed, derived from the start-line,
/// `Content-Length` and `Transfer-Encoding`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Payload {
    /// No payload bytes follow the header.
    #[default]
    None,
    /// Exactly this many payload bytes follow.
    Size(u64),
    /// Chunked transfer encoding.
    Chunked,
    /// The payload extends to the end of the stream.
    ToEof,
    /// The framing headers are contradictory; the payload is undefined.
    Error,
}

/// Aggregated semantic summaries for one header container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub connection: ConnectionInfo,
    pub content_length: ContentLengthInfo,
    pub expect: ExpectInfo,
    pub transfer_encoding: TransferEncodingInfo,
    pub upgrade: UpgradeInfo,
    /// The declared `Content-Encoding`, `Identity` when absent.
    pub content_encoding: ContentCoding,
    /// Number of `Content-Encoding` fields present.
    pub content_encoding_count: u16,
    /// Derived payload classification.
    pub payload: Payload,
}

impl Metadata {
    /// First framing error to report for this header, if any.
    pub(crate) fn framing_error(&self) -> Option<Error> {
        self.content_length
            .error
            .clone()
            .or_else(|| self.transfer_encoding.error.clone())
            .or_else(|| self.connection.error.clone())
            .or_else(|| self.upgrade.error.clone())
            .or_else(|| self.expect.error.clone())
            .or_else(|| {
                if self.payload == Payload::Error {
                    Some(Error::BadPayload)
                } else {
                    None
                }
            })
    }

    /// Whether the connection can be reused after this message.
    pub(crate) fn keep_alive(&self, env: Env) -> bool {
        if self.payload == Payload::Error {
            return false;
        }
        if env.version == Version::HTTP_11 {
            if self.connection.has_close {
                return false;
            }
        } else if !self.connection.has_keep_alive {
            return false;
        }
        if self.payload == Payload::ToEof {
            return false;
        }
        true
    }

    // ---------------------------------------------------------------
    // hooks, called by the store on every mutation

    pub(crate) fn on_insert(&mut self, id: FieldId, value: &[u8], env: Env) {
        if env.kind == Kind::Fields {
            return;
        }
        match id {
            FieldId::Connection => self.on_insert_connection(value),
            FieldId::ContentEncoding => self.on_insert_content_encoding(value),
            FieldId::ContentLength => self.on_insert_content_length(value, env),
            FieldId::Expect => self.on_insert_expect(value, env),
            FieldId::TransferEncoding => {
                // transfer-encoding is order sensitive, the caller
                // re-scans all fields via on_rescan
                unreachable!("transfer-encoding goes through on_rescan")
            }
            FieldId::Upgrade => self.on_insert_upgrade(value, env),
        }
    }

    /// Rebuild one category from all surviving values of its field.
    ///
    /// Used after erasing one of several fields of the same id, and for
    /// every Transfer-Encoding change (the chunked-last rule spans
    /// fields, so it cannot be maintained by a single-field delta).
    pub(crate) fn on_rescan<'a>(
        &mut self,
        id: FieldId,
        values: impl Iterator<Item = &'a [u8]>,
        env: Env,
    ) {
        if env.kind == Kind::Fields {
            return;
        }
        match id {
            FieldId::Connection => {
                self.connection = Default::default();
                for v in values {
                    self.on_insert_connection(v);
                }
            }
            FieldId::ContentEncoding => {
                self.content_encoding = ContentCoding::Identity;
                self.content_encoding_count = 0;
                for v in values {
                    self.on_insert_content_encoding(v);
                }
            }
            FieldId::ContentLength => {
                self.content_length = Default::default();
                for v in values {
                    self.on_insert_content_length(v, env);
                }
                self.update_payload(env);
            }
            FieldId::Expect => {
                self.expect = Default::default();
                for v in values {
                    self.on_insert_expect(v, env);
                }
            }
            FieldId::TransferEncoding => {
                self.transfer_encoding = Default::default();
                for v in values {
                    self.on_insert_transfer_encoding(v);
                }
                self.update_payload(env);
            }
            FieldId::Upgrade => {
                self.upgrade = Default::default();
                for v in values {
                    self.on_insert_upgrade(v, env);
                }
            }
        }
    }

    pub(crate) fn on_erase_all(&mut self, id: FieldId, env: Env) {
        if env.kind == Kind::Fields {
            return;
        }
        match id {
            FieldId::Connection => self.connection = Default::default(),
            FieldId::ContentEncoding => {
                self.content_encoding = ContentCoding::Identity;
                self.content_encoding_count = 0;
            }
            FieldId::ContentLength => {
                self.content_length = Default::default();
                self.update_payload(env);
            }
            FieldId::Expect => self.expect = Default::default(),
            FieldId::TransferEncoding => {
                self.transfer_encoding = Default::default();
                self.update_payload(env);
            }
            FieldId::Upgrade => self.upgrade = Default::default(),
        }
    }

    /// Re-derive the payload classification after a start-line change.
    pub(crate) fn on_start_line(&mut self, env: Env) {
        if env.kind == Kind::Fields {
            return;
        }
        self.update_payload(env);
    }

    // ---------------------------------------------------------------

    /*  References:

        6.1.  Connection
        https://datatracker.ietf.org/doc/html/rfc7230#section-6.1
    */
    fn on_insert_connection(&mut self, value: &[u8]) {
        self.connection.count += 1;
        if self.connection.error.is_some() {
            return;
        }
        let Some(tokens) = grammar::token_list(value) else {
            self.connection.error = Some(Error::BadConnection);
            return;
        };
        for t in tokens {
            if grammar::ci_equal(t, "close") {
                self.connection.has_close = true;
            } else if grammar::ci_equal(t, "keep-alive") {
                self.connection.has_keep_alive = true;
            } else if grammar::ci_equal(t, "upgrade") {
                self.connection.has_upgrade = true;
            }
        }
    }

    fn on_insert_content_length(&mut self, value: &[u8], env: Env) {
        self.content_length.count += 1;
        if self.content_length.error.is_some() {
            return;
        }
        let Ok(v) = grammar::decimal(value) else {
            self.content_length.error = Some(Error::BadContentLength);
            self.content_length.value = 0;
            self.update_payload(env);
            return;
        };
        if self.content_length.count == 1 {
            self.content_length.value = v;
            self.update_payload(env);
            return;
        }
        if v == self.content_length.value {
            // duplicate fields with equal values collapse
            return;
        }
        self.content_length.error = Some(Error::MultipleContentLength);
        self.content_length.value = 0;
        self.update_payload(env);
    }

    fn on_insert_expect(&mut self, value: &[u8], env: Env) {
        self.expect.count += 1;
        if env.kind != Kind::Request {
            return;
        }
        if self.expect.error.is_some() {
            return;
        }
        if self.expect.count > 1 || !grammar::ci_equal(value, "100-continue") {
            self.expect.error = Some(Error::BadExpect);
            self.expect.is_100_continue = false;
            return;
        }
        self.expect.is_100_continue = true;
    }

    /*  References:

        3.3.1.  Transfer-Encoding
        https://datatracker.ietf.org/doc/html/rfc7230#section-3.3.1
    */
    fn on_insert_transfer_encoding(&mut self, value: &[u8]) {
        self.transfer_encoding.count += 1;
        if self.transfer_encoding.error.is_some() {
            return;
        }
        let Some(codings) = grammar::transfer_coding_list(value) else {
            self.fail_transfer_encoding();
            return;
        };
        for t in codings {
            let te = &mut self.transfer_encoding;
            if te.is_chunked {
                // any coding after chunked, including chunked again
                self.fail_transfer_encoding();
                return;
            }
            te.codings += 1;
            if grammar::ci_equal(t, "chunked") {
                te.is_chunked = true;
                continue;
            }
            let was_identity = te.coding == ContentCoding::Identity;
            if grammar::ci_equal(t, "deflate") {
                te.coding = ContentCoding::Deflate;
            } else if grammar::ci_equal(t, "gzip") || grammar::ci_equal(t, "x-gzip") {
                te.coding = ContentCoding::Gzip;
            }
            if !was_identity {
                // a coding stacked onto a compression coding
                self.fail_transfer_encoding();
                return;
            }
        }
    }

    fn fail_transfer_encoding(&mut self) {
        let count = self.transfer_encoding.count;
        self.transfer_encoding = TransferEncodingInfo {
            count,
            error: Some(Error::BadTransferEncoding),
            ..Default::default()
        };
    }

    fn on_insert_upgrade(&mut self, value: &[u8], env: Env) {
        self.upgrade.count += 1;
        if self.upgrade.error.is_some() {
            return;
        }
        if env.version != Version::HTTP_11 {
            self.upgrade.error = Some(Error::BadUpgrade);
            self.upgrade.websocket = false;
            return;
        }
        let Some(protocols) = grammar::upgrade_list(value) else {
            self.upgrade.error = Some(Error::BadUpgrade);
            self.upgrade.websocket = false;
            return;
        };
        if !self.upgrade.websocket {
            for (name, has_version) in protocols {
                if grammar::ci_equal(name, "websocket") && !has_version {
                    self.upgrade.websocket = true;
                    break;
                }
            }
        }
    }

    fn on_insert_content_encoding(&mut self, value: &[u8]) {
        self.content_encoding_count += 1;
        if self.content_encoding_count > 1 {
            // layered or repeated codings are beyond this crate
            self.content_encoding = ContentCoding::Unknown;
            return;
        }
        let mut it = grammar::list(value);
        match (it.next(), it.next()) {
            (Some(t), None) => self.content_encoding = ContentCoding::from_token(t),
            _ => self.content_encoding = ContentCoding::Unknown,
        }
    }

    /*  References:

        3.3.  Message Body
        https://datatracker.ietf.org/doc/html/rfc7230#section-3.3
    */
    fn update_payload(&mut self, env: Env) {
        debug_assert!(env.kind != Kind::Fields);

        if self.content_length.error.is_some() || self.transfer_encoding.error.is_some() {
            // the payload is undefined, close the connection
            self.payload = Payload::Error;
            return;
        }
        if self.content_length.count > 0 && self.transfer_encoding.count > 0 {
            // A sender MUST NOT send a Content-Length header field in
            // any message that contains a Transfer-Encoding header field.
            self.payload = Payload::Error;
            return;
        }

        if env.kind == Kind::Response {
            if env.status / 100 == 1 || env.status == 204 || env.status == 304 {
                // there is no payload regardless of Content-Length
                self.payload = Payload::None;
                return;
            }
            if self.content_length.count > 0 {
                self.payload = if self.content_length.value > 0 {
                    Payload::Size(self.content_length.value)
                } else {
                    Payload::None
                };
                return;
            }
            if self.transfer_encoding.is_chunked {
                self.payload = Payload::Chunked;
                return;
            }
            self.payload = Payload::ToEof;
            return;
        }

        // requests
        if self.content_length.count > 0 {
            self.payload = if self.content_length.value > 0 {
                Payload::Size(self.content_length.value)
            } else {
                Payload::None
            };
            return;
        }
        if self.transfer_encoding.is_chunked {
            self.payload = Payload::Chunked;
            return;
        }
        self.payload = Payload::None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn req_env() -> Env {
        Env {
            kind: Kind::Request,
            version: Version::HTTP_11,
            status: 0,
        }
    }

    fn res_env(status: u16) -> Env {
        Env {
            kind: Kind::Response,
            version: Version::HTTP_11,
            status,
        }
    }

    #[test]
    fn connection_tokens() {
        let mut md = Metadata::default();
        md.on_insert(FieldId::Connection, b"upgrade, close, keep-alive", req_env());
        assert_eq!(md.connection.count, 1);
        assert!(md.connection.has_close);
        assert!(md.connection.has_keep_alive);
        assert!(md.connection.has_upgrade);
        assert_eq!(md.connection.error, None);
    }

    #[test]
    fn content_length_duplicates_collapse() {
        let mut md = Metadata::default();
        md.on_insert(FieldId::ContentLength, b"5", req_env());
        md.on_insert(FieldId::ContentLength, b"5", req_env());
        assert_eq!(md.content_length.count, 2);
        assert_eq!(md.content_length.value, 5);
        assert_eq!(md.content_length.error, None);
        assert_eq!(md.payload, Payload::Size(5));

        md.on_insert(FieldId::ContentLength, b"6", req_env());
        assert_eq!(md.content_length.error, Some(Error::MultipleContentLength));
        assert_eq!(md.payload, Payload::Error);
    }

    #[test]
    fn transfer_encoding_chunked_must_be_last() {
        let mut md = Metadata::default();
        md.on_rescan(
            FieldId::TransferEncoding,
            [&b"gzip"[..], b"chunked"].into_iter(),
            res_env(200),
        );
        assert!(md.transfer_encoding.is_chunked);
        assert_eq!(md.transfer_encoding.codings, 2);
        assert_eq!(md.transfer_encoding.coding, ContentCoding::Gzip);
        assert_eq!(md.payload, Payload::Chunked);

        md.on_rescan(
            FieldId::TransferEncoding,
            [&b"chunked"[..], b"gzip"].into_iter(),
            res_env(200),
        );
        assert_eq!(md.transfer_encoding.error, Some(Error::BadTransferEncoding));
        assert!(!md.transfer_encoding.is_chunked);
        assert_eq!(md.payload, Payload::Error);

        md.on_rescan(
            FieldId::TransferEncoding,
            [&b"chunked"[..], b"chunked"].into_iter(),
            res_env(200),
        );
        assert_eq!(md.transfer_encoding.error, Some(Error::BadTransferEncoding));
    }

    #[test]
    fn expect_100_continue_in_requests_only() {
        let mut md = Metadata::default();
        md.on_insert(FieldId::Expect, b"100-continue", req_env());
        assert!(md.expect.is_100_continue);

        md.on_insert(FieldId::Expect, b"100-continue", req_env());
        assert_eq!(md.expect.error, Some(Error::BadExpect));
        assert!(!md.expect.is_100_continue);

        let mut md = Metadata::default();
        md.on_insert(FieldId::Expect, b"whatever", res_env(200));
        assert_eq!(md.expect.count, 1);
        assert_eq!(md.expect.error, None);
    }

    #[test]
    fn upgrade_requires_http11() {
        let mut md = Metadata::default();
        let env = Env {
            version: Version::HTTP_10,
            ..req_env()
        };
        md.on_insert(FieldId::Upgrade, b"websocket", env);
        assert_eq!(md.upgrade.error, Some(Error::BadUpgrade));

        let mut md = Metadata::default();
        md.on_insert(FieldId::Upgrade, b"websocket", req_env());
        assert!(md.upgrade.websocket);

        let mut md = Metadata::default();
        md.on_insert(FieldId::Upgrade, b"websocket/13", req_env());
        assert!(!md.upgrade.websocket);
    }

    #[test]
    fn payload_classification_response() {
        let mut md = Metadata::default();
        md.on_start_line(res_env(200));
        assert_eq!(md.payload, Payload::ToEof);

        md.on_insert(FieldId::ContentLength, b"0", res_env(200));
        assert_eq!(md.payload, Payload::None);

        // status has the final say for 204
        let mut md = Metadata::default();
        md.on_insert(FieldId::ContentLength, b"10", res_env(204));
        md.on_start_line(res_env(204));
        assert_eq!(md.payload, Payload::None);
    }

    #[test]
    fn both_framing_headers_is_error() {
        let mut md = Metadata::default();
        md.on_insert(FieldId::ContentLength, b"5", res_env(200));
        md.on_rescan(
            FieldId::TransferEncoding,
            [&b"chunked"[..]].into_iter(),
            res_env(200),
        );
        assert_eq!(md.payload, Payload::Error);
    }

    #[test]
    fn keep_alive_rules() {
        let mut md = Metadata::default();
        md.on_start_line(res_env(200));
        md.on_insert(FieldId::ContentLength, b"0", res_env(200));
        assert!(md.keep_alive(res_env(200)));

        md.on_insert(FieldId::Connection, b"close", res_env(200));
        assert!(!md.keep_alive(res_env(200)));

        // http/1.0 requires explicit keep-alive
        let env10 = Env {
            version: Version::HTTP_10,
            ..res_env(200)
        };
        let mut md = Metadata::default();
        md.on_insert(FieldId::ContentLength, b"0", env10);
        md.on_start_line(env10);
        assert!(!md.keep_alive(env10));
        md.on_insert(FieldId::Connection, b"keep-alive", env10);
        assert!(md.keep_alive(env10));
    }

    #[test]
    fn content_encoding_summary() {
        let mut md = Metadata::default();
        md.on_insert(FieldId::ContentEncoding, b"gzip", res_env(200));
        assert_eq!(md.content_encoding, ContentCoding::Gzip);

        md.on_rescan(FieldId::ContentEncoding, [&b"br"[..]].into_iter(), res_env(200));
        assert_eq!(md.content_encoding, ContentCoding::Brotli);

        md.on_rescan(
            FieldId::ContentEncoding,
            [&b"gzip, br"[..]].into_iter(),
            res_env(200),
        );
        assert_eq!(md.content_encoding, ContentCoding::Unknown);

        md.on_erase_all(FieldId::ContentEncoding, res_env(200));
        assert_eq!(md.content_encoding, ContentCoding::Identity);
    }
}
