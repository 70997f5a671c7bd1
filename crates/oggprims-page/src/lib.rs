//! Ogg page framing primitives (RFC 3533).
//!
//! Every page on the wire carries:
//! - The 4-byte capture pattern "OggS" for stream synchronization
//! - A 23-byte fixed header (version, flags, granule, serial, sequence, CRC)
//! - A lacing table of up to 255 segment lengths
//! - The payload, whose length is the sum of the lacing values
//!
//! Packets of any length are split into 255-byte lacing segments and
//! reassembled transparently, including packets that span several pages.

pub mod bits;
pub mod crc;
pub mod error;
pub mod packet;
pub mod page;

pub use bits::BitReader;
pub use crc::crc32;
pub use error::{PageError, Result};
pub use packet::{Packet, PacketFragment, PageInfo};
pub use page::{
    decode_page, ChecksumPolicy, Laced, Page, PageItem, PagePackets, CAPTURE_PATTERN,
    HEADER_SIZE, MAX_LACING_VALUES, MAX_SEGMENT_SIZE,
};
