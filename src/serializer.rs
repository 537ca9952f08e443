//! Incremental HTTP/1.1 message serializer.
//!
//! [`Serializer`] is the long-lived engine owning the workspace. Each
//! message is transmitted through an [`Outgoing`], obtained from one of
//! the `start_*` methods, which borrows the serializer and the message
//! for the transmission. Dropping the `Outgoing` aborts the in-flight
//! message and returns the serializer to idle.
//!
//! Four body styles exist: none ([`Serializer::start_empty`]), a
//! complete buffer sequence ([`Serializer::start_buffers`]), a pull
//! callback ([`Serializer::start_source`]) and an inverted-control
//! stream ([`Serializer::start_stream`]) where the caller pushes body
//! bytes through the handle from [`Outgoing::stream`].
//!
//! Output is drained with [`Outgoing::prepare`] / [`Outgoing::consume`]
//! until [`Outgoing::is_done`]. A request carrying
//! `Expect: 100-continue` yields [`Error::Expect100Continue`] from
//! `prepare` exactly once, after the header has been consumed.

use std::ops::Range;

use crate::body::Source;
use crate::bufs::{Prepared, WriteBufs};
use crate::circular::{transfer, Circular};
use crate::coding::Encoder;
use crate::context::{Context, SerializerConfig};
use crate::fields::Headers;
use crate::filter;
use crate::metadata::{ContentCoding, Kind};
use crate::workspace::Workspace;
use crate::{Error, Request, RequestView, Response, ResponseView, Result};

/// Scratch area for encoded bytes awaiting chunk framing.
const STAGE: usize = 4096;

/// Chunk header (16 hex digits + CRLF) plus the CRLF after the data.
const CHUNK_OVERHEAD: usize = 20;

const FINAL_CHUNK: &[u8] = b"0\r\n\r\n";

/// A message whose header can be transmitted: an owned request or
/// response, or a view of one.
pub trait Message: Headers {}

impl Message for Request {}
impl Message for Response {}
impl Message for RequestView<'_> {}
impl Message for ResponseView<'_> {}

/// The long-lived serialization engine.
pub struct Serializer {
    cfg: SerializerConfig,
    ws: Workspace,
    ring: usize,
}

impl Serializer {
    pub fn new(ctx: &Context) -> Serializer {
        let cfg = ctx.serializer_config().clone();
        let ring = cfg.payload_buffer_size.max(1024);
        let ws = Workspace::new(2 * ring + STAGE + cfg.max_type_erase);
        Serializer { cfg, ws, ring }
    }

    /// Transmit a message with no body.
    pub fn start_empty<'a>(&'a mut self, msg: &'a impl Message) -> Result<Outgoing<'a>> {
        self.start(msg, Input::Buffers { bufs: &[], pos: 0, off: 0 }, false)
    }

    /// Transmit a message whose complete body is the given buffer
    /// sequence.
    ///
    /// With chunked framing and no content coding the total size is
    /// known up front, so the body is framed as a single chunk.
    pub fn start_buffers<'a>(
        &'a mut self,
        msg: &'a impl Message,
        body: &'a [&'a [u8]],
    ) -> Result<Outgoing<'a>> {
        self.start(msg, Input::Buffers { bufs: body, pos: 0, off: 0 }, false)
    }

    /// Transmit a message whose body is pulled from `source`.
    pub fn start_source<'a>(
        &'a mut self,
        msg: &'a impl Message,
        source: &'a mut dyn Source,
    ) -> Result<Outgoing<'a>> {
        self.start(msg, Input::Source(source), false)
    }

    /// Transmit a message whose body the caller pushes through the
    /// [`Stream`] handle.
    pub fn start_stream<'a>(&'a mut self, msg: &'a impl Message) -> Result<Outgoing<'a>> {
        self.start(msg, Input::Stream, true)
    }

    fn start<'a>(
        &'a mut self,
        msg: &'a impl Message,
        input: Input<'a>,
        is_stream: bool,
    ) -> Result<Outgoing<'a>> {
        use crate::fields::sealed::HasStore;
        let store = msg.store();
        let md = store.metadata();
        if let Some(e) = md.framing_error() {
            return Err(e);
        }
        let chunked = md.transfer_encoding.is_chunked;
        let expect100 = store.kind() == Kind::Request && md.expect.is_100_continue;
        let encoder = match md.content_encoding {
            ContentCoding::Identity | ContentCoding::Unknown => None,
            coding => Encoder::from_config(coding, &self.cfg),
        };

        // ring mode whenever bytes must be produced incrementally
        let direct = encoder.is_none() && matches!(input, Input::Buffers { .. });

        self.ws.clear();
        let r0 = self.ws.reserve_front(self.ring);
        let r1 = self.ws.reserve_front(self.ring);
        let rstage = self.ws.reserve_back(STAGE);

        let mut out = Outgoing {
            ws: &mut self.ws,
            header: store.as_bytes(),
            header_pos: 0,
            chunked,
            expect100_pending: expect100,
            fault: None,
            direct,
            is_stream,
            d_chunk_head: [0; 18],
            d_head_len: 0,
            d_head_pos: 0,
            d_bufs: &[],
            d_pos: 0,
            d_off: 0,
            d_tail: &[],
            d_tail_pos: 0,
            input,
            input_finished: false,
            r0,
            c0: Circular::new(self.ring),
            r1,
            c1: Circular::new(self.ring),
            rstage,
            stage_len: 0,
            encoder,
            enc_finished: false,
            final_written: false,
        };

        if direct {
            let bufs = match &out.input {
                Input::Buffers { bufs, .. } => *bufs,
                _ => unreachable!(),
            };
            out.d_bufs = bufs;
            out.input = Input::None;
            out.input_finished = true;
            let total: u64 = bufs.iter().map(|b| b.len() as u64).sum();
            if chunked {
                if total > 0 {
                    out.d_chunk_head = chunk_head(total);
                    out.d_head_len = 18;
                    out.d_tail = b"\r\n0\r\n\r\n";
                } else {
                    out.d_tail = FINAL_CHUNK;
                }
            }
            trace!("start direct, {} body bytes, chunked {}", total, chunked);
        } else {
            trace!("start ring, chunked {}", chunked);
        }

        Ok(out)
    }
}

enum Input<'a> {
    None,
    Buffers {
        bufs: &'a [&'a [u8]],
        pos: usize,
        off: usize,
    },
    Source(&'a mut dyn Source),
    Stream,
}

/// One message in flight. Dropping it aborts the transmission.
pub struct Outgoing<'a> {
    ws: &'a mut Workspace,
    header: &'a [u8],
    header_pos: usize,
    chunked: bool,
    expect100_pending: bool,
    fault: Option<Error>,
    direct: bool,
    is_stream: bool,
    // direct style: header, then an optional chunk head, the caller's
    // buffers, and an optional trailer
    d_chunk_head: [u8; 18],
    d_head_len: usize,
    d_head_pos: usize,
    d_bufs: &'a [&'a [u8]],
    d_pos: usize,
    d_off: usize,
    d_tail: &'static [u8],
    d_tail_pos: usize,
    // ring style: input -> c1 -> (encoder -> stage ->) c0
    input: Input<'a>,
    input_finished: bool,
    r0: Range<usize>,
    c0: Circular,
    r1: Range<usize>,
    c1: Circular,
    rstage: Range<usize>,
    stage_len: usize,
    encoder: Option<Encoder>,
    enc_finished: bool,
    final_written: bool,
}

impl<'a> Outgoing<'a> {
    /// The next slice of ready-to-send bytes.
    ///
    /// Flow signals: [`Error::Expect100Continue`] exactly once after the
    /// header of an expecting request has been consumed, and
    /// [`Error::NeedData`] when a stream or source body has nothing
    /// queued yet. After a source fault the same error is returned on
    /// every call.
    pub fn prepare(&mut self) -> Result<Prepared<'_>> {
        if let Some(e) = &self.fault {
            return Err(e.clone());
        }
        if self.expect100_pending && self.header_pos == self.header.len() {
            self.expect100_pending = false;
            trace!("signal expect 100-continue");
            return Err(Error::Expect100Continue);
        }

        if !self.direct && !self.expect100_pending {
            if let Err(e) = self.pump() {
                self.fault = Some(e.clone());
                return Err(e);
            }
        }

        let mut p = Prepared::new();
        p.push(&self.header[self.header_pos..]);
        if self.expect100_pending {
            // body is withheld until the interim response interlock
            return Ok(p);
        }

        if self.direct {
            p.push(&self.d_chunk_head[self.d_head_pos..self.d_head_len]);
            if self.d_pos < self.d_bufs.len() {
                p.push(&self.d_bufs[self.d_pos][self.d_off..]);
                for b in &self.d_bufs[self.d_pos + 1..] {
                    p.push(b);
                }
            }
            p.push(&self.d_tail[self.d_tail_pos..]);
        } else {
            let (a, b) = self.c0.peek(self.ws.slice(&self.r0));
            p.push(a);
            p.push(b);
        }

        if p.is_empty() && !self.is_done() {
            return Err(Error::NeedData);
        }
        Ok(p)
    }

    /// Consume bytes from the front of what [`Outgoing::prepare`]
    /// returned. Excess is silently capped.
    pub fn consume(&mut self, mut n: usize) {
        let take = n.min(self.header.len() - self.header_pos);
        self.header_pos += take;
        n -= take;
        if self.expect100_pending {
            return;
        }

        if self.direct {
            let take = n.min(self.d_head_len - self.d_head_pos);
            self.d_head_pos += take;
            n -= take;
            while self.d_pos < self.d_bufs.len() {
                let b = self.d_bufs[self.d_pos];
                if self.d_off == b.len() {
                    self.d_pos += 1;
                    self.d_off = 0;
                    continue;
                }
                if n == 0 {
                    break;
                }
                let take = n.min(b.len() - self.d_off);
                self.d_off += take;
                n -= take;
            }
            let take = n.min(self.d_tail.len() - self.d_tail_pos);
            self.d_tail_pos += take;
        } else {
            self.c0.consume(n.min(self.c0.len()));
        }
    }

    /// Whether every byte of the message has been produced and consumed.
    pub fn is_done(&self) -> bool {
        if self.fault.is_some() {
            return false;
        }
        if self.header_pos < self.header.len() || self.expect100_pending {
            return false;
        }
        if self.direct {
            self.d_head_pos == self.d_head_len
                && self.d_remaining() == 0
                && self.d_tail_pos == self.d_tail.len()
        } else {
            self.input_finished
                && self.c1.is_empty()
                && self.stage_len == 0
                && (self.encoder.is_none() || self.enc_finished)
                && (!self.chunked || self.final_written)
                && self.c0.is_empty()
        }
    }

    fn d_remaining(&self) -> usize {
        if self.d_pos >= self.d_bufs.len() {
            return 0;
        }
        let cur = self.d_bufs[self.d_pos].len() - self.d_off;
        cur + self.d_bufs[self.d_pos + 1..]
            .iter()
            .map(|b| b.len())
            .sum::<usize>()
    }

    /// The push handle for a [`Serializer::start_stream`] body.
    pub fn stream(&mut self) -> Stream<'_, 'a> {
        assert!(self.is_stream, "stream() on a non-stream body");
        Stream { out: self }
    }

    // ---------------------------------------------------------------

    /// Move body bytes through the pipeline into the output ring until
    /// nothing more can move.
    fn pump(&mut self) -> Result<()> {
        loop {
            let before = (
                self.c0.len(),
                self.c1.len(),
                self.stage_len,
                self.input_finished,
                self.enc_finished,
                self.final_written,
            );
            self.fill_input()?;
            self.pump_out()?;
            let after = (
                self.c0.len(),
                self.c1.len(),
                self.stage_len,
                self.input_finished,
                self.enc_finished,
                self.final_written,
            );
            if before == after {
                return Ok(());
            }
        }
    }

    /// Pull body bytes from the input into the raw ring.
    fn fill_input(&mut self) -> Result<()> {
        match &mut self.input {
            Input::None | Input::Stream => Ok(()),
            Input::Buffers { bufs, pos, off } => {
                while *pos < bufs.len() {
                    let data = &bufs[*pos][*off..];
                    if data.is_empty() {
                        *pos += 1;
                        *off = 0;
                        continue;
                    }
                    let s1 = self.ws.slice_mut(&self.r1);
                    let n = self.c1.write(s1, data);
                    if n == 0 {
                        break;
                    }
                    *off += n;
                }
                if *pos == bufs.len() {
                    self.input_finished = true;
                }
                Ok(())
            }
            Input::Source(src) => {
                while !self.input_finished {
                    let r = {
                        let s1 = self.ws.slice_mut(&self.r1);
                        let (a, b) = self.c1.prepare(s1, usize::MAX);
                        let seg: &mut [u8] = if a.is_empty() { b } else { a };
                        if seg.is_empty() {
                            break;
                        }
                        src.read(seg)?
                    };
                    self.c1.commit(r.bytes);
                    if r.finished {
                        self.input_finished = true;
                    }
                    if r.bytes == 0 {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    /// Move raw bytes to the output ring, encoding and framing.
    fn pump_out(&mut self) -> Result<()> {
        let has_encoder = self.encoder.is_some();

        if !self.chunked && !has_encoder {
            let (s1, s0) = self.ws.pair_mut(&self.r1, &self.r0);
            transfer(&mut self.c1, s1, &mut self.c0, s0, usize::MAX);
        } else if !self.chunked && has_encoder {
            if !self.enc_finished {
                let more = !(self.input_finished && self.c1.is_empty());
                let r = {
                    let (s1, s0) = self.ws.pair_mut(&self.r1, &self.r0);
                    let (ia, ib) = self.c1.peek(s1);
                    let (oa, ob) = self.c0.prepare(s0, usize::MAX);
                    let enc = self.encoder.as_mut().unwrap();
                    filter::run(enc, (oa, ob), (ia, ib), more)?
                };
                self.c1.consume(r.in_consumed);
                self.c0.commit(r.out_produced);
                if r.finished {
                    self.enc_finished = true;
                }
            }
        } else if self.chunked && !has_encoder {
            // frame straight from the raw ring
            loop {
                if self.c1.is_empty() || self.c0.free() <= CHUNK_OVERHEAD {
                    break;
                }
                let n = self.c1.len().min(self.c0.free() - CHUNK_OVERHEAD);
                let (s1, s0) = self.ws.pair_mut(&self.r1, &self.r0);
                self.c0.write(s0, &chunk_head(n as u64));
                let mut left = n;
                while left > 0 {
                    let take = {
                        let (a, b) = self.c1.peek(s1);
                        let seg: &[u8] = if a.is_empty() { b } else { a };
                        let take = seg.len().min(left);
                        self.c0.write(s0, &seg[..take])
                    };
                    self.c1.consume(take);
                    left -= take;
                }
                self.c0.write(s0, b"\r\n");
            }
        } else {
            // encoder output is staged so each chunk's size is known
            if !self.enc_finished {
                let more = !(self.input_finished && self.c1.is_empty());
                let r = {
                    let (s1, st) = self.ws.pair_mut(&self.r1, &self.rstage);
                    let (ia, ib) = self.c1.peek(s1);
                    let out = &mut st[self.stage_len..];
                    let enc = self.encoder.as_mut().unwrap();
                    filter::run(enc, (out, &mut []), (ia, ib), more)?
                };
                self.c1.consume(r.in_consumed);
                self.stage_len += r.out_produced;
                if r.finished {
                    self.enc_finished = true;
                }
            }
            if self.stage_len > 0 && self.c0.free() > CHUNK_OVERHEAD {
                let n = self.stage_len.min(self.c0.free() - CHUNK_OVERHEAD);
                let (st, s0) = self.ws.pair_mut(&self.rstage, &self.r0);
                self.c0.write(s0, &chunk_head(n as u64));
                self.c0.write(s0, &st[..n]);
                self.c0.write(s0, b"\r\n");
                st.copy_within(n..self.stage_len, 0);
                self.stage_len -= n;
            }
        }

        if self.chunked
            && !self.final_written
            && self.input_finished
            && self.c1.is_empty()
            && self.stage_len == 0
            && (self.encoder.is_none() || self.enc_finished)
            && self.c0.free() >= FINAL_CHUNK.len()
        {
            let s0 = self.ws.slice_mut(&self.r0);
            self.c0.write(s0, FINAL_CHUNK);
            self.final_written = true;
        }
        Ok(())
    }
}

/// Inverted-control body handle obtained from [`Outgoing::stream`].
///
/// The caller writes body bytes through [`Stream::prepare`] /
/// [`Stream::commit`] and signals the end with [`Stream::close`], while
/// draining wire bytes through the owning [`Outgoing`].
pub struct Stream<'s, 'a> {
    out: &'s mut Outgoing<'a>,
}

impl Stream<'_, '_> {
    /// Writable spans for body bytes.
    pub fn prepare(&mut self) -> WriteBufs<'_> {
        let s1 = self.out.ws.slice_mut(&self.out.r1);
        let (a, b) = self.out.c1.prepare(s1, usize::MAX);
        WriteBufs { a, b }
    }

    /// Room left for body bytes right now.
    pub fn capacity(&self) -> usize {
        self.out.c1.free()
    }

    /// Record `n` body bytes written into the prepared spans.
    pub fn commit(&mut self, n: usize) {
        assert!(!self.out.input_finished, "commit after close");
        self.out.c1.commit(n);
    }

    /// No more body bytes will follow.
    pub fn close(&mut self) {
        self.out.input_finished = true;
    }
}

/// A chunk header: 16 zero-padded hex digits and CRLF.
fn chunk_head(n: u64) -> [u8; 18] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut h = [b'0'; 18];
    for i in 0..16 {
        h[15 - i] = HEX[((n >> (4 * i)) & 0xf) as usize];
    }
    h[16] = b'\r';
    h[17] = b'\n';
    h
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::SourceResult;
    use crate::context::ParserConfig;
    use crate::{Context, SerializerConfig};

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.install_parser_service(ParserConfig::new());
        ctx.install_serializer_service(SerializerConfig::new());
        ctx
    }

    /// Drain an outgoing message, consuming `step` bytes at a time.
    fn drain(out: &mut Outgoing<'_>, step: usize) -> Vec<u8> {
        let mut wire = Vec::new();
        let mut saw_100 = false;
        while !out.is_done() {
            let bytes = match out.prepare() {
                Ok(p) => p.concat(),
                Err(Error::Expect100Continue) => {
                    assert!(!saw_100, "100-continue signaled twice");
                    saw_100 = true;
                    continue;
                }
                Err(e) => panic!("{:?}", e),
            };
            let n = bytes.len().min(step);
            wire.extend_from_slice(&bytes[..n]);
            out.consume(n);
        }
        wire
    }

    #[test]
    fn post_with_sized_body_is_byte_exact() {
        let ctx = ctx();
        let mut req = Request::new();
        req.set_start_line(http::Method::POST, "/x", http::Version::HTTP_11)
            .unwrap();
        req.set_content_length(5).unwrap();

        let mut sr = Serializer::new(&ctx);
        let body: &[&[u8]] = &[b"hello"];
        let mut out = sr.start_buffers(&req, body).unwrap();
        let wire = drain(&mut out, usize::MAX);
        assert_eq!(
            wire,
            b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello" as &[u8]
        );
    }

    #[test]
    fn tiny_consume_steps() {
        let ctx = ctx();
        let mut req = Request::new();
        req.set_content_length(10).unwrap();
        let mut sr = Serializer::new(&ctx);
        let body: &[&[u8]] = &[b"0123", b"", b"456789"];
        let mut out = sr.start_buffers(&req, body).unwrap();
        let wire = drain(&mut out, 1);
        assert_eq!(
            wire,
            b"GET / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789" as &[u8]
        );
    }

    #[test]
    fn empty_body_without_framing() {
        let ctx = ctx();
        let res = Response::new();
        let mut sr = Serializer::new(&ctx);
        let mut out = sr.start_empty(&res).unwrap();
        let wire = drain(&mut out, usize::MAX);
        assert_eq!(wire, b"HTTP/1.1 200 OK\r\n\r\n" as &[u8]);
    }

    #[test]
    fn empty_chunked_emits_final_chunk() {
        let ctx = ctx();
        let mut res = Response::new();
        res.set_chunked(true).unwrap();
        let mut sr = Serializer::new(&ctx);
        let mut out = sr.start_empty(&res).unwrap();
        let wire = drain(&mut out, usize::MAX);
        assert_eq!(
            wire,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n" as &[u8]
        );
    }

    #[test]
    fn buffers_chunked_is_a_single_chunk() {
        let ctx = ctx();
        let mut res = Response::new();
        res.set_chunked(true).unwrap();
        let mut sr = Serializer::new(&ctx);
        let body: &[&[u8]] = &[b"hello"];
        let mut out = sr.start_buffers(&res, body).unwrap();
        let wire = drain(&mut out, usize::MAX);
        assert_eq!(
            wire,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0000000000000005\r\nhello\r\n0\r\n\r\n"
                as &[u8]
        );
    }

    #[test]
    fn expect_100_continue_interlock() {
        let ctx = ctx();
        let mut req = Request::new();
        req.set_start_line(http::Method::POST, "/", http::Version::HTTP_11)
            .unwrap();
        req.append("Expect", "100-continue").unwrap();
        req.set_content_length(5).unwrap();

        let mut sr = Serializer::new(&ctx);
        let body: &[&[u8]] = &[b"12345"];
        let mut out = sr.start_buffers(&req, body).unwrap();

        // first prepare returns only the header
        let header = out.prepare().unwrap().concat();
        assert!(header.ends_with(b"\r\n\r\n"));
        assert!(!header.ends_with(b"12345\r\n\r\n"));
        let n = header.len();
        out.consume(n);

        // then the one-time signal
        assert_eq!(out.prepare().unwrap_err(), Error::Expect100Continue);

        // then the body
        let body_concat = out.prepare().unwrap().concat();
        assert_eq!(body_concat, b"12345");
        out.consume(5);
        assert!(out.is_done());
    }

    #[test]
    fn source_body_chunked() {
        let ctx = ctx();
        let mut res = Response::new();
        res.set_chunked(true).unwrap();
        let mut sr = Serializer::new(&ctx);
        let mut src: &[u8] = b"hello, world!";
        let mut out = sr.start_source(&res, &mut src).unwrap();
        let wire = drain(&mut out, usize::MAX);

        let header_end = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".len();
        assert_eq!(
            &wire[header_end..],
            b"000000000000000d\r\nhello, world!\r\n0\r\n\r\n" as &[u8]
        );
    }

    #[test]
    fn source_body_sized() {
        let ctx = ctx();
        let mut res = Response::new();
        res.set_content_length(13).unwrap();
        let mut sr = Serializer::new(&ctx);
        let mut src: &[u8] = b"hello, world!";
        let mut out = sr.start_source(&res, &mut src).unwrap();
        let wire = drain(&mut out, 7);
        assert!(wire.ends_with(b"\r\n\r\nhello, world!"));
    }

    #[test]
    fn stream_body_inverted_control() {
        let ctx = ctx();
        let mut res = Response::new();
        res.set_chunked(true).unwrap();
        let mut sr = Serializer::new(&ctx);
        let mut out = sr.start_stream(&res).unwrap();

        // nothing queued yet: drain the header, then NeedData
        let n = out.prepare().unwrap().total();
        out.consume(n);
        assert_eq!(out.prepare().unwrap_err(), Error::NeedData);

        // push a first piece
        {
            let mut stream = out.stream();
            let mut w = stream.prepare();
            let n = w.put(b"hello");
            stream.commit(n);
        }
        let (concat, n) = {
            let p = out.prepare().unwrap();
            (p.concat(), p.total())
        };
        assert_eq!(concat, b"0000000000000005\r\nhello\r\n");
        out.consume(n);

        // close and flush the final chunk
        out.stream().close();
        let (concat, n) = {
            let p = out.prepare().unwrap();
            (p.concat(), p.total())
        };
        assert_eq!(concat, b"0\r\n\r\n");
        out.consume(n);
        assert!(out.is_done());
    }

    #[test]
    fn faulted_source_sticks() {
        struct Bad;
        impl Source for Bad {
            fn read(&mut self, _buf: &mut [u8]) -> Result<SourceResult> {
                Err(Error::SourceFault("backing store failed"))
            }
        }

        let ctx = ctx();
        let mut res = Response::new();
        res.set_chunked(true).unwrap();
        let mut sr = Serializer::new(&ctx);
        let mut bad = Bad;
        let mut out = sr.start_source(&res, &mut bad).unwrap();

        let e = out.prepare().unwrap_err();
        assert_eq!(e, Error::SourceFault("backing store failed"));
        // the fault latches until the outgoing message is dropped
        assert_eq!(out.prepare().unwrap_err(), e);
        assert!(!out.is_done());
    }

    #[test]
    fn serializer_is_reusable_after_drop() {
        let ctx = ctx();
        let mut sr = Serializer::new(&ctx);

        let req = Request::new();
        {
            let mut out = sr.start_empty(&req).unwrap();
            let p = out.prepare().unwrap();
            // drop mid-flight
            let _ = p;
        }

        let mut res = Response::new();
        res.set_content_length(2).unwrap();
        let body: &[&[u8]] = &[b"ok"];
        let mut out = sr.start_buffers(&res, body).unwrap();
        let wire = drain(&mut out, usize::MAX);
        assert!(wire.ends_with(b"\r\n\r\nok"));
    }

    #[test]
    fn consume_excess_is_capped() {
        let ctx = ctx();
        let req = Request::new();
        let mut sr = Serializer::new(&ctx);
        let mut out = sr.start_empty(&req).unwrap();
        let total = out.prepare().unwrap().total();
        out.consume(total + 1000);
        assert!(out.is_done());
    }

    #[test]
    fn refuses_contradictory_framing() {
        let ctx = ctx();
        let res = Response::parse(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
        let mut sr = Serializer::new(&ctx);
        assert!(sr.start_empty(&res).is_err());
    }
}
