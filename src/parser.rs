//! Incremental HTTP/1.1 message parser.
//!
//! The parser is a state machine over caller-committed bytes: call
//! [`Parser::prepare`] for a writable area, copy wire bytes in, then
//! [`Parser::commit`] and [`Parser::parse`]. `parse` returns
//! [`Error::NeedData`] until it can make progress, and `Ok(())` once the
//! message is complete.
//!
//! Body bytes go to one of three destinations. In-place is the default:
//! the body accumulates in an internal circular buffer exposed through
//! [`Parser::pull_body`] / [`Parser::consume_body`]. Calling
//! [`Parser::parse_sink`] or [`Parser::parse_elastic`] instead of
//! `parse` switches the body (before it completes) to a push sink or a
//! growable destination; the switch first drains anything already held
//! in place.
//!
//! Bytes received past the end of a message are kept; [`Parser::start`]
//! compacts them to the front of the input buffer and begins the next
//! pipelined message.

use std::ops::Range;

use crate::body::{Elastic, Sink};
use crate::bufs::WriteBufs;
use crate::chunked::Dechunker;
use crate::circular::{transfer, Circular};
use crate::coding::Decoder;
use crate::context::{Context, ParserConfig};
use crate::filter;
use crate::metadata::{ContentCoding, Kind, Payload};
use crate::store::Store;
use crate::workspace::Workspace;
use crate::{Error, Headers, RequestView, ResponseView, Result};

/// Scratch area for dechunked bytes on their way into a decoder.
const STAGE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reset,
    Start,
    Header,
    HeaderDone,
    Body,
    /// Message ended with body (and any overread) held in place.
    CompleteInPlace,
    /// Message ended with the body absorbed by a sink or elastic.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum How {
    InPlace,
    Sink,
    Elastic,
}

enum Framing {
    None,
    Sized { left: u64 },
    Chunked(Dechunker),
    ToEof,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FramingKind {
    Sized,
    Chunked,
    ToEof,
}

/// An incremental parser for HTTP/1.1 requests or responses.
pub struct Parser {
    cfg: ParserConfig,
    decode_enabled: bool,
    state: State,
    how: How,
    got_eof: bool,
    got_header: bool,
    ws: Workspace,
    hdr_cap: usize,
    ring: usize,
    rhdr: Range<usize>,
    hdr_len: usize,
    body_started: bool,
    r0: Range<usize>,
    c0: Circular,
    r1: Range<usize>,
    c1: Circular,
    rstage: Range<usize>,
    stage_len: usize,
    framing: Framing,
    decoder: Option<Decoder>,
    dec_finished: bool,
    body_limit: u64,
    body_total: u64,
    msg: Store,
}

impl Parser {
    /// A parser for incoming requests (server side).
    pub fn request(ctx: &Context) -> Parser {
        Parser::new(ctx, Kind::Request)
    }

    /// A parser for incoming responses (client side).
    pub fn response(ctx: &Context) -> Parser {
        Parser::new(ctx, Kind::Response)
    }

    fn new(ctx: &Context, kind: Kind) -> Parser {
        let cfg = ctx.parser_config().clone();
        let hdr_cap = cfg.header_limits.max_total;
        let ring = cfg.min_buffer_size.max(1024);
        let ws = Workspace::new(hdr_cap + 2 * ring + STAGE);
        let mut msg = Store::new(kind);
        msg.set_max_capacity(hdr_cap);
        Parser {
            body_limit: cfg.body_limit,
            // content decoding applies to response payloads
            decode_enabled: kind == Kind::Response,
            cfg,
            state: State::Reset,
            how: How::InPlace,
            got_eof: false,
            got_header: false,
            ws,
            hdr_cap,
            ring,
            rhdr: 0..0,
            hdr_len: 0,
            body_started: false,
            r0: 0..0,
            c0: Circular::new(0),
            r1: 0..0,
            c1: Circular::new(0),
            rstage: 0..0,
            stage_len: 0,
            framing: Framing::None,
            decoder: None,
            dec_finished: false,
            body_total: 0,
            msg,
        }
    }

    /// Whether the header of the current message has been parsed.
    pub fn got_header(&self) -> bool {
        self.got_header
    }

    /// The parsed request. Panics on a response parser.
    pub fn request_view(&self) -> Option<RequestView<'_>> {
        assert!(self.msg.kind() == Kind::Request, "not a request parser");
        self.got_header.then(|| RequestView::new(&self.msg))
    }

    /// The parsed response. Panics on a request parser.
    pub fn response_view(&self) -> Option<ResponseView<'_>> {
        assert!(self.msg.kind() == Kind::Response, "not a response parser");
        self.got_header.then(|| ResponseView::new(&self.msg))
    }

    /// Whether the current message is complete.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::CompleteInPlace | State::Complete)
    }

    /// Adjust the payload limit for the current message.
    ///
    /// Only permitted before any body bytes have been produced; later
    /// calls are a contract violation.
    pub fn set_body_limit(&mut self, n: u64) {
        let ok = match self.state {
            State::Reset | State::Start | State::Header | State::HeaderDone => true,
            State::Body | State::CompleteInPlace | State::Complete => self.body_total == 0,
        };
        assert!(ok, "set_body_limit after body bytes were produced");
        self.body_limit = n;
    }

    /// Begin parsing the next message.
    ///
    /// From a complete state this compacts any overread bytes (already
    /// received bytes of the next pipelined message) to the front of the
    /// input buffer. Calling `start` while a message is in progress is a
    /// contract violation.
    pub fn start(&mut self) {
        let leftover = match self.state {
            State::Reset => 0,
            State::CompleteInPlace | State::Complete => self.compact_overread(),
            _ => panic!("start() while a message is in progress"),
        };
        trace!("start, overread {}", leftover);

        self.ws.clear();
        self.rhdr = self.ws.reserve_front(self.hdr_cap.max(leftover));
        self.hdr_len = leftover;
        self.body_started = false;
        self.stage_len = 0;
        self.framing = Framing::None;
        self.decoder = None;
        self.dec_finished = false;
        self.body_total = 0;
        self.body_limit = self.cfg.body_limit;
        self.how = How::InPlace;
        self.got_header = false;
        self.msg.clear();
        self.state = State::Start;
    }

    /// Abandon the current message and all buffered input.
    ///
    /// The only path back to a usable parser after an unrecoverable
    /// error. [`Parser::start`] must be called before parsing again.
    pub fn reset(&mut self) {
        trace!("reset");
        self.ws.clear();
        self.state = State::Reset;
        self.got_eof = false;
        self.got_header = false;
        self.hdr_len = 0;
        self.body_started = false;
        self.msg.clear();
    }

    /// Move overread bytes to the front of the workspace and return how
    /// many there are.
    fn compact_overread(&mut self) -> usize {
        if self.body_started {
            let stor = self.ws.slice_mut(&self.r0);
            self.c0.linearize(stor);
            // r0 starts at the front of the workspace
            debug_assert_eq!(self.r0.start, 0);
            self.c0.len()
        } else {
            let consumed = self.msg.as_bytes().len();
            let stor = self.ws.slice_mut(&self.rhdr);
            stor.copy_within(consumed..self.hdr_len, 0);
            self.hdr_len - consumed
        }
    }

    // ---------------------------------------------------------------
    // buffer flow control

    /// A writable area for wire bytes.
    ///
    /// During the header phase this is the flat input buffer; during the
    /// body phase it is the input ring. The size is clamped by the
    /// configured `max_prepare`.
    pub fn prepare(&mut self) -> Result<WriteBufs<'_>> {
        assert!(self.state != State::Reset, "prepare() before start()");
        assert!(!self.got_eof, "prepare() after commit_eof()");

        if self.body_started {
            let max = self.cfg.max_prepare;
            let stor = self.ws.slice_mut(&self.r0);
            let (a, b) = self.c0.prepare(stor, max);
            return Ok(WriteBufs { a, b });
        }

        if self.hdr_len == self.rhdr.len() {
            // no room left for a header that has not completed
            return Err(Error::HeadersLimit);
        }
        let end = self.rhdr.len().min(self.hdr_len.saturating_add(self.cfg.max_prepare));
        let start = self.hdr_len;
        let stor = self.ws.slice_mut(&self.rhdr);
        Ok(WriteBufs {
            a: &mut stor[start..end],
            b: &mut [],
        })
    }

    /// Record `n` bytes received into the area from [`Parser::prepare`].
    pub fn commit(&mut self, n: usize) {
        assert!(self.state != State::Reset, "commit() before start()");
        assert!(!self.got_eof, "commit() after commit_eof()");
        if self.body_started {
            self.c0.commit(n);
        } else {
            assert!(self.hdr_len + n <= self.rhdr.len(), "commit past prepared area");
            self.hdr_len += n;
        }
    }

    /// Mark the input stream closed. No further commits are permitted.
    pub fn commit_eof(&mut self) {
        assert!(self.state != State::Reset, "commit_eof() before start()");
        self.got_eof = true;
    }

    // ---------------------------------------------------------------
    // in-place body access

    /// The decoded body bytes currently held in place.
    pub fn pull_body(&self) -> (&[u8], &[u8]) {
        if !self.body_started || self.how != How::InPlace {
            return (&[], &[]);
        }
        self.c1.peek(self.ws.slice(&self.r1))
    }

    /// Discard `n` bytes from the front of the in-place body. Excess is
    /// capped.
    pub fn consume_body(&mut self, n: usize) {
        if self.body_started {
            let n = n.min(self.c1.len());
            self.c1.consume(n);
        }
    }

    // ---------------------------------------------------------------
    // parse

    /// Advance the state machine with the body held in place.
    pub fn parse(&mut self) -> Result<()> {
        if self.how != How::InPlace {
            panic!("parse() after the body was redirected to a sink or elastic");
        }
        let r = self.drive(&mut Dest::InPlace);
        self.settle(r)
    }

    /// Advance the state machine, pushing body bytes into `sink`.
    ///
    /// The first call (permitted once the header is done and until the
    /// body completes) drains any bytes already held in place into the
    /// sink, then all further body bytes follow. Keep calling
    /// `parse_sink` for this message afterwards.
    pub fn parse_sink(&mut self, sink: &mut dyn Sink) -> Result<()> {
        match self.how {
            How::InPlace => {
                assert!(
                    !matches!(self.state, State::CompleteInPlace | State::Complete),
                    "set a body destination after completion"
                );
                trace!("switch body to sink");
                self.how = How::Sink;
            }
            How::Sink => {}
            How::Elastic => panic!("parse_sink() after parse_elastic()"),
        }
        let r = self.drive(&mut Dest::Sink(sink));
        self.settle(r)
    }

    /// Advance the state machine, copying body bytes into `out`.
    ///
    /// Same switching rules as [`Parser::parse_sink`]. The destination's
    /// `max_size` is enforced with [`Error::BufferOverflow`].
    pub fn parse_elastic(&mut self, out: &mut dyn Elastic) -> Result<()> {
        match self.how {
            How::InPlace => {
                assert!(
                    !matches!(self.state, State::CompleteInPlace | State::Complete),
                    "set a body destination after completion"
                );
                trace!("switch body to elastic");
                self.how = How::Elastic;
            }
            How::Elastic => {}
            How::Sink => panic!("parse_elastic() after parse_sink()"),
        }
        let r = self.drive(&mut Dest::Elastic(out));
        self.settle(r)
    }

    /// Taint the parser on unrecoverable errors.
    fn settle(&mut self, r: Result<()>) -> Result<()> {
        if let Err(e) = &r {
            if !e.is_recoverable() {
                self.state = State::Reset;
            }
        }
        r
    }

    fn drive(&mut self, dest: &mut Dest<'_>) -> Result<()> {
        loop {
            match self.state {
                State::Reset => panic!("parse() before start()"),
                State::Start => {
                    if self.hdr_len == 0 && self.got_eof {
                        return Err(Error::EndOfStream);
                    }
                    self.state = State::Header;
                }
                State::Header => {
                    self.parse_header()?;
                }
                State::HeaderDone => {
                    self.classify()?;
                }
                State::Body => {
                    return self.parse_body(dest);
                }
                State::CompleteInPlace | State::Complete => return Ok(()),
            }
        }
    }

    /// Scan the flat buffer for a complete header block, enforcing the
    /// configured limits, then parse it into the message container.
    fn parse_header(&mut self) -> Result<()> {
        let limits = self.cfg.header_limits;
        let data = &self.ws.slice(&self.rhdr)[..self.hdr_len];

        let end = find_block_end(data);

        // limit enforcement works on partial data so oversized headers
        // fail before they are complete
        let scan = &data[..end.unwrap_or(data.len())];
        let start_line_len = match find_crlf(scan) {
            Some(i) => i + 2,
            None => {
                if scan.len() > limits.max_start_line {
                    return Err(Error::StartLineLimit);
                }
                return self.need_header_data();
            }
        };
        if start_line_len > limits.max_start_line {
            return Err(Error::StartLineLimit);
        }

        let mut count = 0;
        let mut line_start = start_line_len;
        loop {
            let rest = &scan[line_start..];
            match find_crlf(rest) {
                Some(p) => {
                    if p + 2 > limits.max_field_size {
                        return Err(Error::FieldSizeLimit);
                    }
                    if p == 0 {
                        break;
                    }
                    // continuation lines count with their field
                    if !matches!(rest.get(p + 2), Some(b' ') | Some(b'\t')) {
                        count += 1;
                        if count > limits.max_field_count {
                            return Err(Error::FieldsLimit);
                        }
                    }
                    line_start += p + 2;
                }
                None => {
                    if rest.len() > limits.max_field_size {
                        return Err(Error::FieldSizeLimit);
                    }
                    break;
                }
            }
        }
        if end.is_none() && data.len() >= limits.max_total {
            return Err(Error::HeadersLimit);
        }

        let Some(end) = end else {
            return self.need_header_data();
        };
        if end > limits.max_total {
            return Err(Error::HeadersLimit);
        }

        let consumed = self.msg.parse_block(&data[..end])?;
        debug_assert_eq!(consumed, end);
        trace!("got header, {} bytes, {} fields", end, self.msg.count());
        self.got_header = true;
        self.state = State::HeaderDone;
        Ok(())
    }

    fn need_header_data(&self) -> Result<()> {
        if self.got_eof {
            return Err(Error::Incomplete);
        }
        Err(Error::NeedData)
    }

    /// One-shot classification after the header: decide framing, engage
    /// the decoder, and partition the workspace for the body.
    fn classify(&mut self) -> Result<()> {
        if let Some(e) = self.msg.metadata().framing_error() {
            return Err(e);
        }

        let payload = self.msg.metadata().payload;
        trace!("classify payload {:?}", payload);

        self.framing = match payload {
            Payload::None => {
                // leftover bytes stay in the flat buffer; start() will
                // compact them for the next message
                self.state = State::CompleteInPlace;
                return Ok(());
            }
            Payload::Size(n) => {
                if n > self.body_limit {
                    return Err(Error::BodyTooLarge);
                }
                Framing::Sized { left: n }
            }
            Payload::Chunked => Framing::Chunked(Dechunker::new()),
            Payload::ToEof => Framing::ToEof,
            Payload::Error => return Err(Error::BadPayload),
        };

        if self.decode_enabled {
            let coding = self.msg.metadata().content_encoding;
            self.decoder = match coding {
                ContentCoding::Identity | ContentCoding::Unknown => None,
                _ => Decoder::from_config(coding, &self.cfg),
            };
            if self.decoder.is_some() {
                trace!("content decoding engaged: {:?}", coding);
            }
        }

        // partition the workspace: the flat buffer becomes the front of
        // the input ring, with the body ring and decode stage behind it
        let consumed = self.msg.as_bytes().len();
        let leftover = self.hdr_len - consumed;
        let stor = self.ws.slice_mut(&self.rhdr);
        stor.copy_within(consumed..self.hdr_len, 0);

        self.ws.clear();
        self.r0 = self.ws.reserve_front(self.hdr_cap + self.ring);
        self.r1 = self.ws.reserve_front(self.ring);
        self.rstage = self.ws.reserve_back(STAGE);
        self.c0 = Circular::new(self.r0.len());
        self.c0.commit(leftover);
        self.c1 = Circular::new(self.r1.len());
        self.stage_len = 0;
        self.body_started = true;

        self.state = State::Body;
        Ok(())
    }

    /// Drive the body until complete, out of input, or out of room.
    fn parse_body(&mut self, dest: &mut Dest<'_>) -> Result<()> {
        loop {
            // drain held bytes to the destination first, so switching
            // from in-place always preserves order
            self.drain_to_dest(dest)?;

            let before = (self.c0.len(), self.c1.len(), self.stage_len);
            self.pump_one()?;

            if self.finished_input() {
                // flush anything still held toward the destination
                self.drain_to_dest(dest)?;
                if self.body_done(dest) {
                    self.state = match self.how {
                        How::InPlace => State::CompleteInPlace,
                        _ => State::Complete,
                    };
                    trace!("message complete, overread {}", self.c0.len());
                    return Ok(());
                }
            }

            let after = (self.c0.len(), self.c1.len(), self.stage_len);
            if before == after {
                return self.no_progress();
            }
        }
    }

    /// Why no further progress is possible right now.
    fn no_progress(&self) -> Result<()> {
        if self.how == How::InPlace && self.c1.free() == 0 {
            return Err(Error::InPlaceOverflow);
        }
        let framing_done = match &self.framing {
            Framing::Sized { left } => *left == 0,
            Framing::Chunked(d) => d.is_done(),
            _ => false,
        };
        if framing_done && self.c1.free() > 0 && self.decoder.is_some() && !self.dec_finished {
            // the framed payload ended but the coding stream did not
            return Err(Error::BadCodingStream);
        }
        if self.got_eof {
            return Err(Error::Incomplete);
        }
        Err(Error::NeedData)
    }

    /// All wire bytes of this message's body have been consumed and
    /// every transformation has flushed.
    fn finished_input(&self) -> bool {
        let framing_done = match &self.framing {
            Framing::None => true,
            Framing::Sized { left } => *left == 0,
            Framing::Chunked(d) => d.is_done(),
            Framing::ToEof => self.got_eof && self.c0.is_empty(),
        };
        let decode_done = match &self.decoder {
            Some(_) => self.dec_finished && self.stage_len == 0,
            None => self.stage_len == 0,
        };
        framing_done && decode_done
    }

    fn body_done(&self, dest: &Dest<'_>) -> bool {
        match dest {
            Dest::InPlace => true,
            // sink and elastic destinations must have absorbed all bytes
            _ => self.c1.is_empty(),
        }
    }

    /// One unit of body progress: move bytes cb0 -> (stage ->) cb1.
    fn pump_one(&mut self) -> Result<()> {
        let fk = match &self.framing {
            Framing::Sized { .. } => FramingKind::Sized,
            Framing::Chunked(_) => FramingKind::Chunked,
            Framing::ToEof => FramingKind::ToEof,
            Framing::None => unreachable!("no framing in body state"),
        };
        let has_decoder = self.decoder.is_some();

        match (fk, has_decoder) {
            (FramingKind::Sized, false) => {
                let Framing::Sized { left } = &mut self.framing else {
                    unreachable!()
                };
                let max = usize_clamp(*left);
                let (s0, s1) = self.ws.pair_mut(&self.r0, &self.r1);
                let n = transfer(&mut self.c0, s0, &mut self.c1, s1, max);
                *left -= n as u64;
                self.count_body(n)?;
            }
            (FramingKind::ToEof, false) => {
                let (s0, s1) = self.ws.pair_mut(&self.r0, &self.r1);
                let n = transfer(&mut self.c0, s0, &mut self.c1, s1, usize::MAX);
                self.count_body(n)?;
            }
            (FramingKind::Chunked, false) => {
                let (s0, s1) = self.ws.pair_mut(&self.r0, &self.r1);
                let Framing::Chunked(d) = &mut self.framing else {
                    unreachable!()
                };
                let mut produced_total = 0;
                while !d.is_done() {
                    let (used, produced) = {
                        let (ia, ib) = self.c0.peek(s0);
                        let in_seg: &[u8] = if ia.is_empty() { ib } else { ia };
                        if in_seg.is_empty() {
                            break;
                        }
                        let (oa, ob) = self.c1.prepare(s1, usize::MAX);
                        let out_seg: &mut [u8] = if oa.is_empty() { ob } else { oa };
                        d.process(in_seg, out_seg)?
                    };
                    self.c0.consume(used);
                    self.c1.commit(produced);
                    produced_total += produced;
                    if used == 0 && produced == 0 {
                        break;
                    }
                }
                self.count_body(produced_total)?;
            }
            (FramingKind::Sized | FramingKind::ToEof, true) => {
                self.pump_decoder_direct(fk)?;
            }
            (FramingKind::Chunked, true) => {
                self.pump_chunked_decoder()?;
            }
        }
        Ok(())
    }

    fn count_body(&mut self, produced: usize) -> Result<()> {
        self.body_total += produced as u64;
        if self.body_total > self.body_limit {
            return Err(Error::BodyTooLarge);
        }
        Ok(())
    }

    /// Sized or to-eof body routed through the decoder: cb0 -> cb1.
    fn pump_decoder_direct(&mut self, fk: FramingKind) -> Result<()> {
        let (more, max_in) = match &self.framing {
            Framing::Sized { left } => (*left > self.c0.len() as u64, usize_clamp(*left)),
            Framing::ToEof => (!self.got_eof, usize::MAX),
            _ => unreachable!(),
        };
        if self.dec_finished {
            // coding stream ended early: discard remaining framed bytes
            let n = self.c0.len().min(max_in);
            self.c0.consume(n);
            if let Framing::Sized { left } = &mut self.framing {
                *left -= n as u64;
            }
            return Ok(());
        }
        let _ = fk;

        let r = {
            let (s0, s1) = self.ws.pair_mut(&self.r0, &self.r1);
            let (ia, ib) = self.c0.peek(s0);
            let (ia, ib) = clamp_pair(ia, ib, max_in);
            let (oa, ob) = self.c1.prepare(s1, usize::MAX);
            let decoder = self.decoder.as_mut().unwrap();
            filter::run(decoder, (oa, ob), (ia, ib), more)?
        };
        self.c0.consume(r.in_consumed);
        self.c1.commit(r.out_produced);
        if let Framing::Sized { left } = &mut self.framing {
            *left -= r.in_consumed as u64;
        }
        if r.finished {
            self.dec_finished = true;
        }
        self.count_body(r.out_produced)
    }

    /// Chunked body routed through the decoder: cb0 -> stage -> cb1.
    fn pump_chunked_decoder(&mut self) -> Result<()> {
        // 1. dechunk into the stage area
        {
            let (s0, st) = self.ws.pair_mut(&self.r0, &self.rstage);
            let Framing::Chunked(d) = &mut self.framing else {
                unreachable!()
            };
            while !d.is_done() {
                let (used, produced) = {
                    let (ia, ib) = self.c0.peek(s0);
                    let in_seg: &[u8] = if ia.is_empty() { ib } else { ia };
                    if in_seg.is_empty() {
                        break;
                    }
                    let out = &mut st[self.stage_len..];
                    d.process(in_seg, out)?
                };
                self.c0.consume(used);
                self.stage_len += produced;
                if used == 0 && produced == 0 {
                    break;
                }
            }
        }

        // 2. decode the staged bytes into cb1
        if self.dec_finished {
            // coding stream ended early: discard the rest
            self.stage_len = 0;
            return Ok(());
        }
        let chunks_done = matches!(&self.framing, Framing::Chunked(d) if d.is_done());
        let r = {
            let (st, s1) = self.ws.pair_mut(&self.rstage, &self.r1);
            let (oa, ob) = self.c1.prepare(s1, usize::MAX);
            let decoder = self.decoder.as_mut().unwrap();
            filter::run(decoder, (oa, ob), (&st[..self.stage_len], &[]), !chunks_done)?
        };
        if r.in_consumed > 0 {
            let st = self.ws.slice_mut(&self.rstage);
            st.copy_within(r.in_consumed..self.stage_len, 0);
            self.stage_len -= r.in_consumed;
        }
        self.c1.commit(r.out_produced);
        if r.finished {
            self.dec_finished = true;
        }
        self.count_body(r.out_produced)
    }

    /// Move held body bytes from cb1 into the sink or elastic.
    fn drain_to_dest(&mut self, dest: &mut Dest<'_>) -> Result<()> {
        match dest {
            Dest::InPlace => Ok(()),
            Dest::Sink(sink) => {
                let input_done = self.finished_input();
                while !self.c1.is_empty() {
                    let n = {
                        let (a, b) = self.c1.peek(self.ws.slice(&self.r1));
                        let seg: &[u8] = if a.is_empty() { b } else { a };
                        let more = !(input_done && seg.len() == self.c1.len());
                        sink.write(seg, more)?
                    };
                    if n == 0 {
                        // backpressure, keep the tail for the next call
                        break;
                    }
                    self.c1.consume(n);
                }
                Ok(())
            }
            Dest::Elastic(el) => {
                while !self.c1.is_empty() {
                    let n = {
                        let (a, b) = self.c1.peek(self.ws.slice(&self.r1));
                        let seg: &[u8] = if a.is_empty() { b } else { a };
                        if el.len() + seg.len() > el.max_size() {
                            return Err(Error::BufferOverflow);
                        }
                        el.append(seg);
                        seg.len()
                    };
                    self.c1.consume(n);
                }
                Ok(())
            }
        }
    }
}

enum Dest<'a> {
    InPlace,
    Sink(&'a mut dyn Sink),
    Elastic(&'a mut dyn Elastic),
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Find the end of a header block: one past the blank-line CRLF.
fn find_block_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn clamp_pair<'a>(a: &'a [u8], b: &'a [u8], max: usize) -> (&'a [u8], &'a [u8]) {
    if a.len() >= max {
        (&a[..max], &[])
    } else {
        let nb = b.len().min(max - a.len());
        (a, &b[..nb])
    }
}

fn usize_clamp(v: u64) -> usize {
    v.min(usize::MAX as u64) as usize
}
