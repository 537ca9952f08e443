//! Sans-IO HTTP/1.1 message codec.
//!
//! peck implements HTTP/1.1 message framing without considering transport:
//! an incremental [`Parser`], an incremental [`Serializer`], and the mutable
//! header containers ([`Request`], [`Response`], [`Fields`]) they operate on.
//! The caller owns the sockets and drives the state machines by moving bytes
//! in and out of the buffers this crate prepares.
//!
//! # In scope:
//!
//! * HTTP/1.0 and HTTP/1.1 header and body framing (RFC 7230)
//! * `transfer-encoding: chunked` in both directions
//! * Incrementally maintained header semantics (connection, content-length,
//!   transfer-encoding, expect, upgrade) and payload classification
//! * Transparent content-coding filters (deflate, gzip, and optionally
//!   brotli) on both the parse and serialize side
//!
//! # Out of scope:
//!
//! * Opening/closing sockets, TLS
//! * HTTP/2 and HTTP/3
//! * URL parsing beyond passing the request-target through
//! * Connection pooling, redirects, cookie jars
//!
//! # The http crate
//!
//! peck is based on the [http crate](https://crates.io/crates/http) - a
//! unified HTTP API for Rust. Start-lines are typed with `http::Method`,
//! `http::StatusCode` and `http::Version`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::needless_lifetimes)]

// Re-export the basis for this library.
pub use http;

#[macro_use]
extern crate log;

mod error;
pub use error::{Error, Result};

pub mod grammar;

mod metadata;
pub use metadata::{ConnectionInfo, ContentLengthInfo, ExpectInfo, Metadata};
pub use metadata::{ContentCoding, Payload, TransferEncodingInfo, UpgradeInfo};

mod store;

mod fields;
pub use fields::{Field, FieldIter, Fields, FieldsView, Headers};

mod request;
pub use request::{Request, RequestView};

mod response;
pub use response::{Response, ResponseView};

mod workspace;

mod circular;

mod chunked;

mod filter;

mod coding;

mod context;
pub use context::{Context, ParserConfig, SerializerConfig};

mod body;
pub use body::{Elastic, Sink, Source, SourceResult};

mod bufs;
pub use bufs::{Prepared, WriteBufs};

pub mod parser;
pub use parser::Parser;

pub mod serializer;
pub use serializer::{Message, Outgoing, Serializer};
