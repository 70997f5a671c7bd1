//! Packet-level reading and writing of multiplexed Ogg streams.
//!
//! A physical Ogg file interleaves the pages of several logical streams,
//! each named by a serial number. This crate provides:
//! - [`PacketReader`]: resynchronizing, reassembling packet source
//! - [`PacketWriter`]: per-stream page builder that writes only on flush
//! - [`OggFile`]: a file bound to one direction, with serial allocation
//! - [`demultiplex`]: a push-based loop fanning packets out to sinks
//!
//! Everything is synchronous and single-threaded.

pub mod demux;
pub mod error;
pub mod reader;
pub mod serial;
pub mod session;
pub mod writer;

pub use demux::{demultiplex, DemuxReport, PacketSink, StreamClassifier};
pub use error::{Mode, Result, StreamError};
pub use reader::{PacketReader, ReadWarning, ReaderConfig, DEFAULT_MAX_SYNC_SEARCH};
pub use serial::{SerialAllocator, SERIAL_RANGE};
pub use session::OggFile;
pub use writer::{PacketWriter, PageSink};
