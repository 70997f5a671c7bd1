use std::fmt;

use oggprims_page::PageError;

/// Errors that can occur while reading or writing Ogg streams.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Page-level error (bad version, bad capture, bit reader misuse).
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// An I/O error occurred on the underlying source or sink.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No capture pattern was found within the configured search window.
    #[error("capture pattern not found after skipping {skipped} bytes")]
    SyncNotFound { skipped: usize },

    /// The packet writer for this stream has already been closed.
    #[error("writer for stream {0} is closed")]
    WriterClosed(u32),

    /// The operation is not available in the file's mode.
    #[error("cannot {operation}: file is open for {mode}")]
    WrongMode {
        operation: &'static str,
        mode: Mode,
    },

    /// A packet is already waiting in the pushback slot.
    #[error("a packet has already been unread")]
    PushbackOccupied,

    /// The serial number has already been issued in this file.
    #[error("serial number {0} is already in use")]
    SerialInUse(u32),

    /// Every serial number in the allocation range has been issued.
    #[error("all {0} serial numbers are in use")]
    SerialsExhausted(u32),
}

/// Which direction an [`crate::OggFile`] was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Reading,
    Writing,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Reading => f.write_str("reading"),
            Mode::Writing => f.write_str("writing"),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
