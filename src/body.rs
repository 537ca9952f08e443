//! Caller-supplied body destinations and sources.

use crate::Result;

/// A push destination for parsed body bytes.
///
/// The sink may apply backpressure by accepting fewer bytes than
/// offered; the parser keeps the rest and offers it again on the next
/// call. `more = false` accompanies the final bytes of the body.
pub trait Sink {
    fn write(&mut self, data: &[u8], more: bool) -> Result<usize>;
}

impl Sink for Vec<u8> {
    fn write(&mut self, data: &[u8], _more: bool) -> Result<usize> {
        self.extend_from_slice(data);
        Ok(data.len())
    }
}

/// A growable destination receiving the complete parsed body.
///
/// The parser checks [`Elastic::max_size`] before every append and
/// fails with [`crate::Error::BufferOverflow`] when the body cannot fit.
pub trait Elastic {
    /// Upper bound on the total bytes this destination can hold.
    fn max_size(&self) -> usize {
        usize::MAX
    }

    /// Bytes currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&mut self, data: &[u8]);
}

impl Elastic for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn append(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

/// Result of one [`Source::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceResult {
    /// Bytes written into the buffer.
    pub bytes: usize,
    /// No more body bytes will ever be produced.
    pub finished: bool,
}

/// A pull source producing body bytes for the serializer.
///
/// A hard error from the source faults the serializer; see
/// [`crate::Error::SourceFault`].
pub trait Source {
    fn read(&mut self, buf: &mut [u8]) -> Result<SourceResult>;
}

/// A complete body held in a byte slice.
impl Source for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> Result<SourceResult> {
        let n = self.len().min(buf.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        Ok(SourceResult {
            bytes: n,
            finished: self.is_empty(),
        })
    }
}

/// An [`Elastic`] wrapper with an explicit size cap.
#[derive(Debug, Default)]
pub struct Capped {
    pub vec: Vec<u8>,
    pub cap: usize,
}

impl Capped {
    pub fn new(cap: usize) -> Capped {
        Capped {
            vec: Vec::new(),
            cap,
        }
    }
}

impl Elastic for Capped {
    fn max_size(&self) -> usize {
        self.cap
    }

    fn len(&self) -> usize {
        self.vec.len()
    }

    fn append(&mut self, data: &[u8]) {
        self.vec.extend_from_slice(data);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slice_source_drains() {
        let mut src: &[u8] = b"abcdef";
        let mut buf = [0u8; 4];
        let r = src.read(&mut buf).unwrap();
        assert_eq!((r.bytes, r.finished), (4, false));
        let r = src.read(&mut buf).unwrap();
        assert_eq!((r.bytes, r.finished), (2, true));
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn capped_elastic_reports_limit() {
        let c = Capped::new(10);
        assert_eq!(c.max_size(), 10);
        assert_eq!(Elastic::len(&c), 0);
    }
}
