use thiserror::Error;

/// The single error taxonomy surfaced across the whole crate.
///
/// Every decoder, adapter, and archive reader in this crate returns
/// `Result<T, CodecError>`; callers can match on the variant rather than
/// parsing message strings.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying byte source failed, or a read came back short.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The format dispatcher saw enough leading bytes to decide and none of
    /// the registered predicates matched.
    #[error("unrecognized stream signature")]
    Signature,

    /// A header field was out of range, or a structural invariant the format
    /// guarantees did not hold.
    #[error("malformed stream: {0}")]
    Format(String),

    /// End of stream was observed where the decoder required more bits or
    /// bytes to complete a symbol.
    #[error("truncated stream: {0}")]
    TruncatedStream(String),

    /// A requested dictionary or window size exceeds the configured cap.
    #[error("memory limit exceeded: requested {requested} KiB, limit {limit} KiB")]
    MemoryLimit { requested: u64, limit: u64 },

    /// A flag combination is valid per the format but this crate does not
    /// implement it (e.g. ZIP encryption, `pack200` bodies, unusual ar
    /// symbol-table dialects).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        CodecError::Format(msg.into())
    }

    pub(crate) fn truncated(msg: impl Into<String>) -> Self {
        CodecError::TruncatedStream(msg.into())
    }
}
