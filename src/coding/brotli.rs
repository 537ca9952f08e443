//! Brotli filters over the brotli crate's streaming entry points.

use brotli::enc::encode::{BrotliEncoderOperation, BrotliEncoderParameter, BrotliEncoderStateStruct};
use brotli::enc::StandardAlloc;
use brotli::{BrotliDecompressStream, BrotliResult, BrotliState};

use crate::filter::{Filter, FilterResult};
use crate::{Error, Result};

pub(crate) struct BrotliEncoder {
    state: BrotliEncoderStateStruct<StandardAlloc>,
}

impl BrotliEncoder {
    pub fn new(quality: u32, window: u32) -> BrotliEncoder {
        let mut state = BrotliEncoderStateStruct::new(StandardAlloc::default());
        state.set_parameter(BrotliEncoderParameter::BROTLI_PARAM_QUALITY, quality);
        state.set_parameter(BrotliEncoderParameter::BROTLI_PARAM_LGWIN, window);
        BrotliEncoder { state }
    }
}

impl Filter for BrotliEncoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        let op = if more {
            BrotliEncoderOperation::BROTLI_OPERATION_PROCESS
        } else {
            BrotliEncoderOperation::BROTLI_OPERATION_FINISH
        };
        let mut avail_in = input.len();
        let mut in_off = 0;
        let mut avail_out = out.len();
        let mut out_off = 0;
        let mut total_out = Some(0);
        let ok = self.state.compress_stream(
            op,
            &mut avail_in,
            input,
            &mut in_off,
            &mut avail_out,
            out,
            &mut out_off,
            &mut total_out,
            &mut |_, _, _, _| (),
        );
        if !ok {
            return Err(Error::BadCodingStream);
        }
        Ok(FilterResult {
            in_consumed: in_off,
            out_produced: out_off,
            finished: self.state.is_finished(),
            out_short: in_off == 0 && out_off == 0 && !input.is_empty(),
        })
    }
}

pub(crate) struct BrotliDecoder {
    state: BrotliState<StandardAlloc, StandardAlloc, StandardAlloc>,
    finished: bool,
}

impl BrotliDecoder {
    pub fn new() -> BrotliDecoder {
        BrotliDecoder {
            state: BrotliState::new(
                StandardAlloc::default(),
                StandardAlloc::default(),
                StandardAlloc::default(),
            ),
            finished: false,
        }
    }
}

impl Filter for BrotliDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], _more: bool) -> Result<FilterResult> {
        if self.finished {
            return Ok(FilterResult {
                finished: true,
                ..Default::default()
            });
        }
        let mut avail_in = input.len();
        let mut in_off = 0;
        let mut avail_out = out.len();
        let mut out_off = 0;
        let mut total_out = 0;
        let result = BrotliDecompressStream(
            &mut avail_in,
            &mut in_off,
            input,
            &mut avail_out,
            &mut out_off,
            out,
            &mut total_out,
            &mut self.state,
        );
        match result {
            BrotliResult::ResultFailure => Err(Error::BadCodingStream),
            BrotliResult::ResultSuccess => {
                self.finished = true;
                Ok(FilterResult {
                    in_consumed: in_off,
                    out_produced: out_off,
                    finished: true,
                    out_short: false,
                })
            }
            BrotliResult::NeedsMoreInput | BrotliResult::NeedsMoreOutput => Ok(FilterResult {
                in_consumed: in_off,
                out_produced: out_off,
                finished: false,
                out_short: matches!(result, BrotliResult::NeedsMoreOutput)
                    && in_off == 0
                    && out_off == 0,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn brotli_round_trip() {
        let data: Vec<u8> = (0..20_000u32).flat_map(|i| (i % 127).to_le_bytes()).collect();

        let mut enc = BrotliEncoder::new(5, 22);
        let mut wire = Vec::new();
        let mut buf = [0u8; 129];
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

        let mut dec = BrotliDecoder::new();
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
        assert_eq!(out, data);
    }
}
