//! Process-wide context holding the parser and serializer service
//! configuration.
//!
//! Services are installed exactly once, before any parser or serializer
//! that needs them is constructed; afterwards the context is read-only.
//! Installing a service twice, or constructing an engine without its
//! service, is a programming bug and panics.

/// Limits applied to an incoming header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimits {
    /// Maximum size of the request-line or status-line.
    pub max_start_line: usize,
    /// Maximum size of a single field line.
    pub max_field_size: usize,
    /// Maximum number of fields.
    pub max_field_count: usize,
    /// Maximum size of the whole header block, start-line through the
    /// final CRLF.
    pub max_total: usize,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        HeaderLimits {
            max_start_line: 4096,
            max_field_size: 4096,
            max_field_count: 100,
            max_total: 16384,
        }
    }
}

/// Configuration installed with
/// [`Context::install_parser_service`].
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub header_limits: HeaderLimits,
    /// Smallest circular buffer the parser will carve for body bytes.
    pub min_buffer_size: usize,
    /// Clamp on the writable span returned by `prepare()`.
    pub max_prepare: usize,
    /// Upper bound on the decoded payload size of one message.
    pub body_limit: u64,
    pub apply_deflate_decoder: bool,
    pub apply_gzip_decoder: bool,
    pub apply_brotli_decoder: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            header_limits: HeaderLimits::default(),
            min_buffer_size: 4096,
            max_prepare: usize::MAX,
            body_limit: 64 * 1024,
            apply_deflate_decoder: false,
            apply_gzip_decoder: false,
            apply_brotli_decoder: false,
        }
    }
}

impl ParserConfig {
    pub fn new() -> ParserConfig {
        ParserConfig::default()
    }
}

/// Configuration installed with
/// [`Context::install_serializer_service`].
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub apply_deflate_encoder: bool,
    pub apply_gzip_encoder: bool,
    pub apply_brotli_encoder: bool,
    pub brotli_quality: u32,
    pub brotli_window: u32,
    pub zlib_level: u32,
    /// Size of the circular buffer used for source, stream and filtered
    /// bodies.
    pub payload_buffer_size: usize,
    /// Extra workspace headroom for codec scratch.
    pub max_type_erase: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        SerializerConfig {
            apply_deflate_encoder: false,
            apply_gzip_encoder: false,
            apply_brotli_encoder: false,
            brotli_quality: 5,
            brotli_window: 22,
            zlib_level: 6,
            payload_buffer_size: 16384,
            max_type_erase: 1024,
        }
    }
}

impl SerializerConfig {
    pub fn new() -> SerializerConfig {
        SerializerConfig::default()
    }
}

/// Holds the installed services.
///
/// Read-only service lookup is safe from concurrent callers; mutation
/// (installation) must happen before the context is shared.
#[derive(Debug, Default)]
pub struct Context {
    parser: Option<ParserConfig>,
    serializer: Option<SerializerConfig>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Install the parser service. Panics when called twice.
    pub fn install_parser_service(&mut self, cfg: ParserConfig) {
        assert!(
            self.parser.is_none(),
            "parser service is already installed"
        );
        self.parser = Some(cfg);
    }

    /// Install the serializer service. Panics when called twice.
    pub fn install_serializer_service(&mut self, cfg: SerializerConfig) {
        assert!(
            self.serializer.is_none(),
            "serializer service is already installed"
        );
        self.serializer = Some(cfg);
    }

    pub(crate) fn parser_config(&self) -> &ParserConfig {
        self.parser
            .as_ref()
            .expect("parser service is not installed")
    }

    pub(crate) fn serializer_config(&self) -> &SerializerConfig {
        self.serializer
            .as_ref()
            .expect("serializer service is not installed")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn install_once() {
        let mut ctx = Context::new();
        ctx.install_parser_service(ParserConfig::new());
        ctx.install_serializer_service(SerializerConfig::new());
        assert_eq!(ctx.parser_config().header_limits.max_field_count, 100);
        assert_eq!(ctx.serializer_config().zlib_level, 6);
    }

    #[test]
    #[should_panic(expected = "already installed")]
    fn double_install_panics() {
        let mut ctx = Context::new();
        ctx.install_parser_service(ParserConfig::new());
        ctx.install_parser_service(ParserConfig::new());
    }

    #[test]
    #[should_panic(expected = "not installed")]
    fn missing_service_panics() {
        let ctx = Context::new();
        let _ = ctx.parser_config();
    }
}
