//! Content-coding filters over the external compression crates.
//!
//! Each coding is a pair of [`Filter`] implementations selected by a
//! tagged enum, so codec state lives inline in its parser or serializer
//! without dynamic dispatch.

#[cfg(any(feature = "deflate", feature = "gzip"))]
mod zlib;

#[cfg(feature = "gzip")]
mod gzip;

#[cfg(feature = "brotli")]
mod brotli;

use crate::context::{ParserConfig, SerializerConfig};
use crate::filter::{Filter, FilterResult};
use crate::metadata::ContentCoding;
use crate::Result;

/// A content decoder for the parse side.
pub(crate) enum Decoder {
    #[cfg(feature = "deflate")]
    Deflate(zlib::ZlibDecoder),
    #[cfg(feature = "gzip")]
    Gzip(gzip::GzipDecoder),
    #[cfg(feature = "brotli")]
    Brotli(Box<brotli::BrotliDecoder>),
}

impl Decoder {
    /// A decoder for this coding, when the parser configuration enables
    /// it. `None` means the body passes through undecoded.
    pub fn from_config(coding: ContentCoding, cfg: &ParserConfig) -> Option<Decoder> {
        let _ = cfg;
        match coding {
            #[cfg(feature = "deflate")]
            ContentCoding::Deflate if cfg.apply_deflate_decoder => {
                Some(Decoder::Deflate(zlib::ZlibDecoder::new(true)))
            }
            #[cfg(feature = "gzip")]
            ContentCoding::Gzip if cfg.apply_gzip_decoder => {
                Some(Decoder::Gzip(gzip::GzipDecoder::new()))
            }
            #[cfg(feature = "brotli")]
            ContentCoding::Brotli if cfg.apply_brotli_decoder => {
                Some(Decoder::Brotli(Box::new(brotli::BrotliDecoder::new())))
            }
            _ => None,
        }
    }
}

impl Filter for Decoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        match self {
            #[cfg(feature = "deflate")]
            Decoder::Deflate(f) => f.process(out, input, more),
            #[cfg(feature = "gzip")]
            Decoder::Gzip(f) => f.process(out, input, more),
            #[cfg(feature = "brotli")]
            Decoder::Brotli(f) => f.process(out, input, more),
            #[allow(unreachable_patterns)]
            _ => unreachable!("decoder variant without its feature"),
        }
    }
}

/// A content encoder for the serialize side.
pub(crate) enum Encoder {
    #[cfg(feature = "deflate")]
    Deflate(zlib::ZlibEncoder),
    #[cfg(feature = "gzip")]
    Gzip(gzip::GzipEncoder),
    #[cfg(feature = "brotli")]
    Brotli(Box<brotli::BrotliEncoder>),
}

impl Encoder {
    /// An encoder for this coding, when the serializer configuration
    /// enables it. `None` means the body is sent as given.
    pub fn from_config(coding: ContentCoding, cfg: &SerializerConfig) -> Option<Encoder> {
        let _ = cfg;
        match coding {
            #[cfg(feature = "deflate")]
            ContentCoding::Deflate if cfg.apply_deflate_encoder => {
                Some(Encoder::Deflate(zlib::ZlibEncoder::new(cfg.zlib_level, true)))
            }
            #[cfg(feature = "gzip")]
            ContentCoding::Gzip if cfg.apply_gzip_encoder => {
                Some(Encoder::Gzip(gzip::GzipEncoder::new(cfg.zlib_level)))
            }
            #[cfg(feature = "brotli")]
            ContentCoding::Brotli if cfg.apply_brotli_encoder => Some(Encoder::Brotli(Box::new(
                brotli::BrotliEncoder::new(cfg.brotli_quality, cfg.brotli_window),
            ))),
            _ => None,
        }
    }
}

impl Filter for Encoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool) -> Result<FilterResult> {
        match self {
            #[cfg(feature = "deflate")]
            Encoder::Deflate(f) => f.process(out, input, more),
            #[cfg(feature = "gzip")]
            Encoder::Gzip(f) => f.process(out, input, more),
            #[cfg(feature = "brotli")]
            Encoder::Brotli(f) => f.process(out, input, more),
            #[allow(unreachable_patterns)]
            _ => unreachable!("encoder variant without its feature"),
        }
    }
}
