//! Deflate filters over flate2's streaming state.
//!
//! The `deflate` content coding is the zlib format of RFC 1950; the
//! gzip filters reuse these types with the zlib header disabled.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::filter::{Filter, FilterResult};
use crate::{Error, Result};

pub(crate) struct ZlibDecoder {
    z: Decompress,
}

impl ZlibDecoder {
    pub fn new(zlib_header: bool) -> ZlibDecoder {
        ZlibDecoder {
            z: Decompress::new(zlib_header),
        }
    }
}

impl Filter for ZlibDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        let in_before = self.z.total_in();
        let out_before = self.z.total_out();
        let flush = if more {
            FlushDecompress::None
        } else {
            FlushDecompress::Finish
        };
        let status = self
            .z
            .decompress(input, out, flush)
            .map_err(|_| Error::BadCodingStream)?;
        let in_consumed = (self.z.total_in() - in_before) as usize;
        let out_produced = (self.z.total_out() - out_before) as usize;
        Ok(FilterResult {
            in_consumed,
            out_produced,
            finished: status == Status::StreamEnd,
            out_short: status == Status::BufError
                && in_consumed == 0
                && out_produced == 0
                && !input.is_empty(),
        })
    }
}

pub(crate) struct ZlibEncoder {
    z: Compress,
}

impl ZlibEncoder {
    pub fn new(level: u32, zlib_header: bool) -> ZlibEncoder {
        ZlibEncoder {
            z: Compress::new(Compression::new(level), zlib_header),
        }
    }
}

impl Filter for ZlibEncoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        let in_before = self.z.total_in();
        let out_before = self.z.total_out();
        let flush = if more {
            FlushCompress::None
        } else {
            FlushCompress::Finish
        };
        let status = self
            .z
            .compress(input, out, flush)
            .map_err(|_| Error::BadCodingStream)?;
        let in_consumed = (self.z.total_in() - in_before) as usize;
        let out_produced = (self.z.total_out() - out_before) as usize;
        Ok(FilterResult {
            in_consumed,
            out_produced,
            finished: status == Status::StreamEnd,
            out_short: status == Status::BufError
                && in_consumed == 0
                && out_produced == 0
                && !input.is_empty(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drive(enc: &mut dyn Filter, dec: &mut dyn Filter, data: &[u8]) -> Vec<u8> {
        // encode in small steps
        let mut wire = Vec::new();
        let mut buf = [0u8; 61];
        let mut fed = 0;
        loop {
            let more = fed < data.len();
            let r = enc.process(&mut buf, &data[fed..], more).unwrap();
            fed += r.in_consumed;
            wire.extend_from_slice(&buf[..r.out_produced]);
            if r.finished {
                break;
            }
        }
        // decode in small steps
        let mut out = Vec::new();
        let mut used = 0;
        loop {
            let more = used < wire.len();
            let r = dec.process(&mut buf, &wire[used..], more).unwrap();
            used += r.in_consumed;
            out.extend_from_slice(&buf[..r.out_produced]);
            if r.finished {
                break;
            }
        }
        out
    }

    #[test]
    fn zlib_round_trip() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let mut enc = ZlibEncoder::new(6, true);
        let mut dec = ZlibDecoder::new(true);
        let out = drive(&mut enc, &mut dec, &data);
        assert_eq!(out, data);
    }

    #[test]
    fn corrupt_stream_rejected() {
        let mut dec = ZlibDecoder::new(true);
        let mut buf = [0u8; 64];
        let r = dec.process(&mut buf, b"this is not zlib data at all....", true);
        assert_eq!(r.unwrap_err(), Error::BadCodingStream);
    }
}
