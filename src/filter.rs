//! Streaming byte transformer contract used for content codings.

use crate::Result;

/// Outcome of one [`Filter::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FilterResult {
    pub in_consumed: usize,
    pub out_produced: usize,
    /// The filter will never produce more output from the bytes seen so
    /// far. Terminal.
    pub finished: bool,
    /// The output buffer is too small to make progress even though
    /// input remains; the caller must supply a larger output area.
    pub out_short: bool,
}

/// A streaming byte transformer.
///
/// `more = false` is the caller's commitment never to feed more input;
/// the filter then flushes and eventually reports `finished`. Filters
/// are re-entrant across calls and buffer no input beyond what the
/// underlying codec requires.
pub(crate) trait Filter {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult>;
}

/// Drive a filter across two-segment input and output spans, calling the
/// single-buffer [`Filter::process`] until input is exhausted, output is
/// full, or the filter reports finished.
pub(crate) fn run(
    f: &mut dyn Filter,
    out: (&mut [u8], &mut [u8]),
    input: (&[u8], &[u8]),
    more: bool,
) -> Result<FilterResult> {
    let (mut oa, mut ob) = out;
    let (mut ia, mut ib) = input;
    let mut total = FilterResult::default();

    loop {
        let use_ia = !ia.is_empty();
        let in_cur: &[u8] = if use_ia { ia } else { ib };
        // within a multi-segment span, later segments count as "more"
        let seg_more = more || (use_ia && !ib.is_empty());

        let use_oa = !oa.is_empty();
        let out_cur: &mut [u8] = if use_oa { &mut *oa } else { &mut *ob };

        let r = f.process(out_cur, in_cur, seg_more)?;
        total.in_consumed += r.in_consumed;
        total.out_produced += r.out_produced;

        if use_ia {
            ia = &ia[r.in_consumed..];
        } else {
            ib = &ib[r.in_consumed..];
        }
        if use_oa {
            let (_, rest) = std::mem::take(&mut oa).split_at_mut(r.out_produced);
            oa = rest;
        } else {
            let (_, rest) = std::mem::take(&mut ob).split_at_mut(r.out_produced);
            ob = rest;
        }

        if r.finished {
            total.finished = true;
            return Ok(total);
        }
        if r.in_consumed == 0 && r.out_produced == 0 {
            // no progress: out of output space, or waiting for input
            total.out_short = r.out_short || (oa.is_empty() && ob.is_empty());
            return Ok(total);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Uppercases bytes and appends one `!` when the input ends.
    struct Shout {
        bang: bool,
    }

    impl Filter for Shout {
        fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
            let n = input.len().min(out.len());
            for (o, i) in out.iter_mut().zip(input[..n].iter()) {
                *o = i.to_ascii_uppercase();
            }
            let mut out_produced = n;
            let mut finished = false;
            if !more && n == input.len() && !self.bang {
                if out_produced < out.len() {
                    out[out_produced] = b'!';
                    out_produced += 1;
                    self.bang = true;
                    finished = true;
                }
            } else if self.bang {
                finished = true;
            }
            Ok(FilterResult {
                in_consumed: n,
                out_produced,
                finished,
                out_short: false,
            })
        }
    }

    #[test]
    fn run_crosses_segments() {
        let mut f = Shout { bang: false };
        let mut out_a = [0u8; 3];
        let mut out_b = [0u8; 5];
        let r = run(&mut f, (&mut out_a, &mut out_b), (b"ab", b"cd"), false).unwrap();
        assert!(r.finished);
        assert_eq!(r.in_consumed, 4);
        assert_eq!(r.out_produced, 5);
        let all: Vec<u8> = out_a.iter().chain(out_b.iter()).copied().collect();
        assert_eq!(&all[..5], b"ABCD!");
    }

    #[test]
    fn run_reports_out_short() {
        let mut f = Shout { bang: false };
        let mut out_a = [0u8; 1];
        let r = run(&mut f, (&mut out_a, &mut []), (b"abc", b""), true).unwrap();
        assert_eq!(r.in_consumed, 1);
        assert_eq!(r.out_produced, 1);
        assert!(r.out_short);
    }
}
