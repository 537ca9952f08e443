use thiserror::Error;

/// Errors and flow-control signals produced by this crate.
///
/// The first group are not failures: [`Error::NeedData`],
/// [`Error::EndOfStream`] and [`Error::Expect100Continue`] are
/// return-to-caller signals of the sans-IO state machines. Everything in
/// the last group taints the parser or serializer that produced it and
/// requires a reset before reuse. [`Error::is_recoverable()`] tells the
/// two apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The parser needs more input before it can make progress.
    #[error("need more input data")]
    NeedData,

    /// The stream ended cleanly between messages.
    #[error("end of stream")]
    EndOfStream,

    /// The stream ended in the middle of a message.
    #[error("incomplete message at end of stream")]
    Incomplete,

    /// The request carries `Expect: 100-continue`; await the interim
    /// response before sending the body.
    #[error("await 100-continue before sending body")]
    Expect100Continue,

    /// The combined start-line and header fields exceed the configured
    /// total size.
    #[error("headers exceed configured limit")]
    HeadersLimit,

    /// The start-line exceeds the configured size.
    #[error("start-line exceeds configured limit")]
    StartLineLimit,

    /// A single header field exceeds the configured size.
    #[error("header field exceeds configured size")]
    FieldSizeLimit,

    /// The number of header fields exceeds the configured count.
    #[error("too many header fields")]
    FieldsLimit,

    /// The payload exceeds the configured body limit, whether declared
    /// up front by `Content-Length` or discovered while streaming.
    #[error("body larger than body limit")]
    BodyTooLarge,

    /// The elastic body cannot grow to hold the payload.
    #[error("elastic body buffer overflow")]
    BufferOverflow,

    /// The in-place body buffer is full while payload remains. Recover by
    /// draining with `consume_body()` or switching to a sink or elastic
    /// body.
    #[error("in-place body buffer overflow")]
    InPlaceOverflow,

    /// Malformed body framing, such as a bad chunk header.
    #[error("invalid payload framing")]
    BadPayload,

    /// `Content-Length` is not a valid unsigned decimal number.
    #[error("invalid content-length")]
    BadContentLength,

    /// Multiple `Content-Length` fields with differing values.
    #[error("conflicting content-length values")]
    MultipleContentLength,

    /// Invalid `Transfer-Encoding`, such as `chunked` repeated or not
    /// last.
    #[error("invalid transfer-encoding")]
    BadTransferEncoding,

    /// `Connection` is not a valid list of tokens.
    #[error("invalid connection header")]
    BadConnection,

    /// Invalid `Upgrade` header, or `Upgrade` under HTTP/1.0.
    #[error("invalid upgrade header")]
    BadUpgrade,

    /// `Expect` with a value other than `100-continue` in a request.
    #[error("invalid expect header")]
    BadExpect,

    /// Invalid byte in a header field name.
    #[error("invalid header field name")]
    BadFieldName,

    /// Invalid byte in a header field value.
    #[error("invalid header field value")]
    BadFieldValue,

    /// A field value embeds a bare CR, LF or NUL that would terminate the
    /// field early on the wire.
    #[error("field value smuggles a line break")]
    BadFieldSmuggle,

    /// Invalid request-line or status-line.
    #[error("invalid start-line")]
    BadStartLine,

    /// Invalid or unsupported HTTP version.
    #[error("invalid http version")]
    BadVersion,

    /// A container operation would exceed `max_capacity`, or a size or
    /// count no longer fits in 16 bits.
    #[error("container capacity limit exceeded")]
    LengthLimit,

    /// A content-coding stream is corrupt.
    #[error("content coding stream is corrupt")]
    BadCodingStream,

    /// A caller-supplied body source failed. The serializer is faulted;
    /// the connection must be terminated.
    #[error("body source failed: {0}")]
    SourceFault(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Whether the state machine that returned this error can continue
    /// without a reset.
    ///
    /// `NeedData`, `EndOfStream` and `Expect100Continue` are flow-control
    /// signals. `InPlaceOverflow` is recoverable by draining the in-place
    /// body or switching to a sink or elastic destination. Everything
    /// else is terminal for the current message.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NeedData | Error::EndOfStream | Error::Expect100Continue | Error::InPlaceOverflow
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recoverable_partition() {
        assert!(Error::NeedData.is_recoverable());
        assert!(Error::InPlaceOverflow.is_recoverable());
        assert!(Error::Expect100Continue.is_recoverable());
        assert!(!Error::BadPayload.is_recoverable());
        assert!(!Error::BadTransferEncoding.is_recoverable());
        assert!(!Error::Incomplete.is_recoverable());
    }

    #[test]
    fn display_is_terse() {
        assert_eq!(Error::NeedData.to_string(), "need more input data");
        assert_eq!(
            Error::MultipleContentLength.to_string(),
            "conflicting content-length values"
        );
    }
}
