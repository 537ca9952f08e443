//! Gzip filters: raw deflate framed by the RFC 1952 header and trailer.
//!
//! flate2's streaming types only cover the deflate stream itself, so the
//! gzip member framing is done here, byte-granular in both directions so
//! the filters make progress through any output window.

use flate2::Crc;

use super::zlib::{ZlibDecoder, ZlibEncoder};
use crate::filter::{Filter, FilterResult};
use crate::{Error, Result};

// magic, deflate, no flags, mtime 0, no extra flags, unknown OS
const HEADER: [u8; 10] = [0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 0xff];

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;

enum EncState {
    Header { pos: usize },
    Body,
    Trailer { pos: usize, bytes: [u8; 8] },
    Done,
}

pub(crate) struct GzipEncoder {
    state: EncState,
    deflate: ZlibEncoder,
    crc: Crc,
}

impl GzipEncoder {
    pub fn new(level: u32) -> GzipEncoder {
        GzipEncoder {
            state: EncState::Header { pos: 0 },
            deflate: ZlibEncoder::new(level, false),
            crc: Crc::new(),
        }
    }
}

impl Filter for GzipEncoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        let mut used = 0;
        let mut produced = 0;

        loop {
            match &mut self.state {
                EncState::Header { pos } => {
                    let n = (HEADER.len() - *pos).min(out.len() - produced);
                    out[produced..produced + n].copy_from_slice(&HEADER[*pos..*pos + n]);
                    *pos += n;
                    produced += n;
                    if *pos < HEADER.len() {
                        return Ok(short(used, produced, !input.is_empty() || !more));
                    }
                    self.state = EncState::Body;
                }
                EncState::Body => {
                    let r = self
                        .deflate
                        .process(&mut out[produced..], &input[used..], more)?;
                    self.crc.update(&input[used..used + r.in_consumed]);
                    used += r.in_consumed;
                    produced += r.out_produced;
                    if r.finished {
                        let mut bytes = [0u8; 8];
                        bytes[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
                        bytes[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
                        self.state = EncState::Trailer { pos: 0, bytes };
                        continue;
                    }
                    return Ok(FilterResult {
                        in_consumed: used,
                        out_produced: produced,
                        finished: false,
                        out_short: r.out_short
                            || (r.in_consumed == 0 && r.out_produced == 0 && produced == out.len()),
                    });
                }
                EncState::Trailer { pos, bytes } => {
                    let n = (8 - *pos).min(out.len() - produced);
                    out[produced..produced + n].copy_from_slice(&bytes[*pos..*pos + n]);
                    *pos += n;
                    produced += n;
                    if *pos < 8 {
                        return Ok(short(used, produced, true));
                    }
                    self.state = EncState::Done;
                }
                EncState::Done => {
                    return Ok(FilterResult {
                        in_consumed: used,
                        out_produced: produced,
                        finished: true,
                        out_short: false,
                    });
                }
            }
        }
    }
}

fn short(used: usize, produced: usize, out_short: bool) -> FilterResult {
    FilterResult {
        in_consumed: used,
        out_produced: produced,
        finished: false,
        out_short,
    }
}

enum DecState {
    Header { pos: usize, buf: [u8; 10] },
    ExtraLen { pos: usize, buf: [u8; 2] },
    ExtraSkip { left: usize },
    Name,
    Comment,
    HeaderCrc { left: usize },
    Body,
    Trailer { pos: usize, buf: [u8; 8] },
    Done,
}

pub(crate) struct GzipDecoder {
    state: DecState,
    flg: u8,
    inflate: ZlibDecoder,
    crc: Crc,
}

impl GzipDecoder {
    pub fn new() -> GzipDecoder {
        GzipDecoder {
            state: DecState::Header {
                pos: 0,
                buf: [0; 10],
            },
            flg: 0,
            inflate: ZlibDecoder::new(false),
            crc: Crc::new(),
        }
    }

    /// The state that follows the fixed header, given the FLG bits not
    /// yet handled. RFC 1952 orders them FEXTRA, FNAME, FCOMMENT, FHCRC.
    fn next_header_part(&mut self) -> DecState {
        if self.flg & FEXTRA != 0 {
            self.flg &= !FEXTRA;
            return DecState::ExtraLen { pos: 0, buf: [0; 2] };
        }
        if self.flg & FNAME != 0 {
            self.flg &= !FNAME;
            return DecState::Name;
        }
        if self.flg & FCOMMENT != 0 {
            self.flg &= !FCOMMENT;
            return DecState::Comment;
        }
        if self.flg & FHCRC != 0 {
            self.flg &= !FHCRC;
            return DecState::HeaderCrc { left: 2 };
        }
        DecState::Body
    }
}

impl Filter for GzipDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        let mut used = 0;
        let mut produced = 0;

        loop {
            match &mut self.state {
                DecState::Header { pos, buf } => {
                    let n = (10 - *pos).min(input.len() - used);
                    buf[*pos..*pos + n].copy_from_slice(&input[used..used + n]);
                    *pos += n;
                    used += n;
                    if *pos < 10 {
                        return Ok(short(used, produced, false));
                    }
                    if buf[0] != 0x1f || buf[1] != 0x8b || buf[2] != 8 {
                        return Err(Error::BadCodingStream);
                    }
                    self.flg = buf[3];
                    self.state = self.next_header_part();
                }
                DecState::ExtraLen { pos, buf } => {
                    let n = (2 - *pos).min(input.len() - used);
                    buf[*pos..*pos + n].copy_from_slice(&input[used..used + n]);
                    *pos += n;
                    used += n;
                    if *pos < 2 {
                        return Ok(short(used, produced, false));
                    }
                    let left = u16::from_le_bytes(*buf) as usize;
                    self.state = DecState::ExtraSkip { left };
                }
                DecState::ExtraSkip { left } => {
                    let n = (*left).min(input.len() - used);
                    *left -= n;
                    used += n;
                    if *left > 0 {
                        return Ok(short(used, produced, false));
                    }
                    self.state = self.next_header_part();
                }
                DecState::Name | DecState::Comment => {
                    match input[used..].iter().position(|c| *c == 0) {
                        Some(i) => {
                            used += i + 1;
                            self.state = self.next_header_part();
                        }
                        None => {
                            used = input.len();
                            return Ok(short(used, produced, false));
                        }
                    }
                }
                DecState::HeaderCrc { left } => {
                    let n = (*left).min(input.len() - used);
                    *left -= n;
                    used += n;
                    if *left > 0 {
                        return Ok(short(used, produced, false));
                    }
                    self.state = self.next_header_part();
                }
                DecState::Body => {
                    let r = self
                        .inflate
                        .process(&mut out[produced..], &input[used..], more)?;
                    self.crc.update(&out[produced..produced + r.out_produced]);
                    used += r.in_consumed;
                    produced += r.out_produced;
                    if r.finished {
                        self.state = DecState::Trailer { pos: 0, buf: [0; 8] };
                        continue;
                    }
                    return Ok(FilterResult {
                        in_consumed: used,
                        out_produced: produced,
                        finished: false,
                        out_short: r.out_short
                            || (r.in_consumed == 0 && r.out_produced == 0 && produced == out.len()),
                    });
                }
                DecState::Trailer { pos, buf } => {
                    let n = (8 - *pos).min(input.len() - used);
                    buf[*pos..*pos + n].copy_from_slice(&input[used..used + n]);
                    *pos += n;
                    used += n;
                    if *pos < 8 {
                        return Ok(short(used, produced, false));
                    }
                    let crc32 = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                    let isize = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
                    if crc32 != self.crc.sum() || isize != self.crc.amount() {
                        return Err(Error::BadCodingStream);
                    }
                    self.state = DecState::Done;
                }
                DecState::Done => {
                    return Ok(FilterResult {
                        in_consumed: used,
                        out_produced: produced,
                        finished: true,
                        out_short: false,
                    });
                }
            }
        }
    }
}
