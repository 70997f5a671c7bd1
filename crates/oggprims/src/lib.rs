//! Ogg container primitives with permissive licensing.
//!
//! oggprims reads and writes the Ogg physical bitstream (RFC 3533): page
//! framing and checksums, packet lacing across pages, and multiplexing of
//! several logical streams in one file. Codec payloads are opaque.
//!
//! # Crate Structure
//!
//! - [`page`]: page layout, CRC-32, lacing, packets and the bit reader
//! - [`stream`]: packet reader and writer, `OggFile`, demultiplexing

/// Re-export page types.
pub mod page {
    pub use oggprims_page::*;
}

/// Re-export stream types.
pub mod stream {
    pub use oggprims_stream::*;
}
