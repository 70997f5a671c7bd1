/// Errors that can occur while decoding pages or reading bits.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// The page does not start with the "OggS" capture pattern.
    #[error("invalid capture pattern (expected \"OggS\")")]
    InvalidCapture,

    /// The page header declares a stream structure version other than 0.
    #[error("unsupported page version {0} (expected 0)")]
    InvalidVersion(u8),

    /// A single bit read was wider than the 32-bit accumulator.
    #[error("cannot read {0} bits at once (max 32)")]
    InvalidBitWidth(u32),

    /// An I/O error occurred while reading or writing a page.
    #[error("page I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PageError>;
