use std::io::Write;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::crc::crc32;
use crate::error::{PageError, Result};
use crate::packet::{Packet, PacketFragment, PageInfo};

/// Fixed header size, before the lacing table.
pub const HEADER_SIZE: usize = 27;

/// Capture pattern: "OggS".
pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

/// Maximum number of lacing values (segments) on one page.
pub const MAX_LACING_VALUES: usize = 255;

/// Maximum length of one lacing segment. A segment of this length means the
/// packet continues in the next segment.
pub const MAX_SEGMENT_SIZE: usize = 255;

const STREAM_VERSION: u8 = 0;
const CHECKSUM_OFFSET: usize = 22;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// How to treat a page whose stored checksum is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Always recompute and compare.
    #[default]
    Strict,
    /// Accept a stored checksum of exactly zero without recomputing.
    ///
    /// Tolerates writers that never fill in the CRC, at the cost of
    /// accepting corrupted pages whose checksum field happens to be zero.
    AcceptZero,
}

/// Result of laying out (part of) a packet on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Laced {
    /// The packet's final segment is on this page.
    Complete,
    /// The page ran out of lacing values; resume from this byte offset on
    /// the next page.
    Partial(usize),
}

/// One Ogg page: header fields, lacing table and payload.
///
/// Wire format (multi-byte fields little-endian):
/// ```text
/// ┌──────────┬─────────┬───────┬───────────┬────────┬──────────┬───────┬─────────┬──────────┬─────────┐
/// │ "OggS"   │ version │ flags │ granule   │ serial │ sequence │ CRC   │ N (1B)  │ lacing   │ payload │
/// │ (4B)     │ (1B)=0  │ (1B)  │ (8B, i64) │ (4B)   │ (4B)     │ (4B)  │         │ (N B)    │ (ΣB)    │
/// └──────────┴─────────┴───────┴───────────┴────────┴──────────┴───────┴─────────┴──────────┴─────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    sid: u32,
    sequence_number: u32,
    granule_position: i64,
    flags: u8,
    checksum: u32,
    lacing: Vec<u8>,
    payload: BytesMut,
}

impl Page {
    /// Create an empty page for writing.
    pub fn new(sid: u32, sequence_number: u32) -> Self {
        Self {
            sid,
            sequence_number,
            granule_position: 0,
            flags: 0,
            checksum: 0,
            lacing: Vec::new(),
            payload: BytesMut::new(),
        }
    }

    pub fn sid(&self) -> u32 {
        self.sid
    }

    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    pub fn granule_position(&self) -> i64 {
        self.granule_position
    }

    pub fn set_granule_position(&mut self, granule_position: i64) {
        self.granule_position = granule_position;
    }

    /// Whether the first segment continues a packet from the previous page.
    pub fn is_continued(&self) -> bool {
        self.flags & FLAG_CONTINUED != 0
    }

    pub fn is_beginning_of_stream(&self) -> bool {
        self.flags & FLAG_BOS != 0
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags & FLAG_EOS != 0
    }

    pub fn set_beginning_of_stream(&mut self, bos: bool) {
        self.set_flag(FLAG_BOS, bos);
    }

    pub fn set_end_of_stream(&mut self, eos: bool) {
        self.set_flag(FLAG_EOS, eos);
    }

    /// Checksum as stored in the header. Zero for pages built in memory.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn lacing(&self) -> &[u8] {
        &self.lacing
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header plus lacing table size.
    pub fn header_size(&self) -> usize {
        HEADER_SIZE + self.lacing.len()
    }

    /// Total wire size of this page.
    pub fn size(&self) -> usize {
        self.header_size() + self.payload.len()
    }

    /// Number of packets that end on this page.
    pub fn packet_count(&self) -> usize {
        self.lacing
            .iter()
            .filter(|&&v| usize::from(v) < MAX_SEGMENT_SIZE)
            .count()
    }

    /// Whether a packet of `bytes` bytes fits entirely on this page.
    pub fn has_space_for(&self, bytes: usize) -> bool {
        self.lacing.len() + bytes / MAX_SEGMENT_SIZE + 1 <= MAX_LACING_VALUES
    }

    /// Lay out `packet` from byte `offset` onward.
    ///
    /// Consumes lacing values until the packet ends or the page is full. A
    /// packet whose length is a multiple of 255 (including an empty packet)
    /// ends with a zero-length segment.
    pub fn add_packet(&mut self, packet: &Packet, offset: usize) -> Laced {
        let data = packet.data();
        let mut offset = offset.min(data.len());

        if self.lacing.is_empty() && offset > 0 {
            self.set_flag(FLAG_CONTINUED, true);
        }
        if packet.is_beginning_of_stream() && offset == 0 {
            self.set_flag(FLAG_BOS, true);
        }

        loop {
            if self.lacing.len() == MAX_LACING_VALUES {
                return Laced::Partial(offset);
            }

            let chunk = (data.len() - offset).min(MAX_SEGMENT_SIZE);
            self.lacing.push(chunk as u8);
            self.payload.extend_from_slice(&data[offset..offset + chunk]);
            offset += chunk;

            if chunk < MAX_SEGMENT_SIZE {
                if packet.is_end_of_stream() {
                    self.set_flag(FLAG_EOS, true);
                }
                return Laced::Complete;
            }
        }
    }

    /// Compute the CRC over the header (checksum field zeroed) and payload.
    pub fn compute_checksum(&self) -> u32 {
        let mut header = BytesMut::with_capacity(self.header_size());
        self.put_header(&mut header, 0);
        crc32(&self.payload, crc32(&header, 0))
    }

    /// Whether the stored checksum matches the page contents.
    pub fn is_checksum_valid(&self, policy: ChecksumPolicy) -> bool {
        if policy == ChecksumPolicy::AcceptZero && self.checksum == 0 {
            return true;
        }
        self.compute_checksum() == self.checksum
    }

    /// Encode the header and lacing table, with a freshly computed CRC.
    ///
    /// The payload is not included; write [`Page::payload`] after it.
    pub fn encode_header(&self, dst: &mut BytesMut) {
        let start = dst.len();
        self.put_header(dst, 0);
        let crc = crc32(&self.payload, crc32(&dst[start..], 0));
        dst[start + CHECKSUM_OFFSET..start + CHECKSUM_OFFSET + 4]
            .copy_from_slice(&crc.to_le_bytes());
    }

    /// The encoded header and lacing table.
    pub fn header_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.header_size());
        self.encode_header(&mut dst);
        dst.freeze()
    }

    /// Write the header, then the payload.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.header_bytes())?;
        writer.write_all(&self.payload)
    }

    /// Iterate the packets laced on this page.
    ///
    /// `carried` is the fragment left over from this stream's previous page;
    /// it is prepended to the first packet.
    pub fn packets(&self, carried: Option<PacketFragment>) -> PagePackets<'_> {
        PagePackets {
            page: self,
            index: 0,
            offset: 0,
            carried,
        }
    }

    fn put_header(&self, dst: &mut BytesMut, checksum: u32) {
        dst.reserve(self.header_size());
        dst.put_slice(&CAPTURE_PATTERN);
        dst.put_u8(STREAM_VERSION);
        dst.put_u8(self.flags);
        dst.put_i64_le(self.granule_position);
        dst.put_u32_le(self.sid);
        dst.put_u32_le(self.sequence_number);
        dst.put_u32_le(checksum);
        dst.put_u8(self.lacing.len() as u8);
        dst.put_slice(&self.lacing);
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }
}

/// Decode one page from the front of `src`.
///
/// `src` must start at a capture pattern. Returns `Ok(None)` if the buffer
/// doesn't contain a complete page yet. On success, consumes the page bytes
/// from the buffer.
pub fn decode_page(src: &mut BytesMut) -> Result<Option<Page>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..4] != CAPTURE_PATTERN {
        debug!("page does not start with capture pattern");
        return Err(PageError::InvalidCapture);
    }
    if src[4] != STREAM_VERSION {
        debug!(version = src[4], "unsupported page version");
        return Err(PageError::InvalidVersion(src[4]));
    }

    let lacing_count = usize::from(src[HEADER_SIZE - 1]);
    if src.len() < HEADER_SIZE + lacing_count {
        return Ok(None);
    }

    let payload_len: usize = src[HEADER_SIZE..HEADER_SIZE + lacing_count]
        .iter()
        .map(|&v| usize::from(v))
        .sum();
    if src.len() < HEADER_SIZE + lacing_count + payload_len {
        return Ok(None);
    }

    let header = src.split_to(HEADER_SIZE);
    let mut fields = &header[5..];
    let flags = fields.get_u8();
    let granule_position = fields.get_i64_le();
    let sid = fields.get_u32_le();
    let sequence_number = fields.get_u32_le();
    let checksum = fields.get_u32_le();

    let lacing = src.split_to(lacing_count).to_vec();
    let payload = src.split_to(payload_len);
    trace!(sid, sequence_number, segments = lacing_count, payload_len, "decoded page");

    Ok(Some(Page {
        sid,
        sequence_number,
        granule_position,
        flags,
        checksum,
        lacing,
        payload,
    }))
}

/// Something yielded while walking a page's lacing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageItem {
    /// A packet that ends on this page.
    Packet(Packet),
    /// The start of a packet that continues on the stream's next page.
    Fragment(PacketFragment),
}

/// Iterator over the packets of one page. See [`Page::packets`].
pub struct PagePackets<'a> {
    page: &'a Page,
    index: usize,
    offset: usize,
    carried: Option<PacketFragment>,
}

impl Iterator for PagePackets<'_> {
    type Item = PageItem;

    fn next(&mut self) -> Option<PageItem> {
        let lacing = &self.page.lacing;
        if self.index >= lacing.len() {
            return self.carried.take().map(PageItem::Fragment);
        }

        let start_index = self.index;
        let mut size = 0;
        let mut complete = false;
        while self.index < lacing.len() {
            let value = usize::from(lacing[self.index]);
            size += value;
            self.index += 1;
            if value < MAX_SEGMENT_SIZE {
                complete = true;
                break;
            }
        }

        let bytes = &self.page.payload[self.offset..self.offset + size];
        self.offset += size;

        let head = if start_index == 0 {
            self.carried.take()
        } else {
            None
        };

        let opens_stream =
            self.page.is_beginning_of_stream() && start_index == 0 && head.is_none();

        if !complete {
            let mut fragment = head.unwrap_or_default();
            if opens_stream {
                fragment.set_beginning_of_stream(true);
            }
            fragment.extend(bytes);
            return Some(PageItem::Fragment(fragment));
        }

        let bos = opens_stream
            || head
                .as_ref()
                .is_some_and(PacketFragment::is_beginning_of_stream);
        let eos = self.page.is_end_of_stream() && self.index == lacing.len();
        let data = match head {
            Some(mut fragment) => {
                fragment.extend(bytes);
                fragment.into_bytes()
            }
            None => Bytes::copy_from_slice(bytes),
        };

        let segments = self.index - start_index;
        let header_size = self.page.header_size();
        let info = PageInfo {
            sid: self.page.sid,
            granule_position: self.page.granule_position,
            sequence_number: self.page.sequence_number,
            overhead_bytes: (header_size * segments + lacing.len() / 2) / lacing.len(),
        };

        Some(PageItem::Packet(Packet::from_page(data, bos, eos, info)))
    }
}
