use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use oggprims_page::{
    decode_page, ChecksumPolicy, Packet, PacketFragment, Page, PageItem, CAPTURE_PATTERN,
};
use tracing::{debug, warn};

use crate::error::{Result, StreamError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default resynchronization window: 64 KiB.
pub const DEFAULT_MAX_SYNC_SEARCH: usize = 64 * 1024;

/// Configuration for the packet reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Junk bytes tolerated before a capture pattern. Default: 64 KiB.
    pub max_sync_search: usize,
    /// Treatment of zero checksums. Default: [`ChecksumPolicy::Strict`].
    pub checksum_policy: ChecksumPolicy,
    /// Recompute page checksums and warn on mismatch. Default: true.
    pub verify_checksums: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_sync_search: DEFAULT_MAX_SYNC_SEARCH,
            checksum_policy: ChecksumPolicy::Strict,
            verify_checksums: true,
        }
    }
}

/// Recoverable anomalies seen while reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWarning {
    /// Bytes skipped while searching for a capture pattern.
    JunkSkipped { bytes: usize },
    /// A page whose stored checksum doesn't match its contents.
    ChecksumMismatch { sid: u32, sequence: u32 },
    /// The source ended inside a page.
    TruncatedPage { buffered: usize },
    /// A continued page arrived without the start of its packet.
    OrphanedContinuation { sid: u32, sequence: u32 },
    /// A packet start was dropped because the next page didn't continue it
    /// or the input ended first.
    DiscardedFragment { sid: u32, bytes: usize },
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadWarning::JunkSkipped { bytes } => {
                write!(f, "skipped {bytes} junk bytes before capture pattern")
            }
            ReadWarning::ChecksumMismatch { sid, sequence } => {
                write!(f, "invalid checksum on page {sequence} of stream {sid}")
            }
            ReadWarning::TruncatedPage { buffered } => {
                write!(f, "end of input inside a page ({buffered} bytes buffered)")
            }
            ReadWarning::OrphanedContinuation { sid, sequence } => write!(
                f,
                "page {sequence} of stream {sid} continues a packet that was never started"
            ),
            ReadWarning::DiscardedFragment { sid, bytes } => write!(
                f,
                "dropped {bytes} bytes of unfinished packet on stream {sid}"
            ),
        }
    }
}

type WarningHandler = Box<dyn FnMut(&ReadWarning)>;

/// Reads packets from any `Read` source containing Ogg pages.
///
/// Resynchronizes on the capture pattern, reassembles packets split across
/// pages, and demultiplexes logical streams on request. Pages are loaded
/// lazily, one at a time.
pub struct PacketReader<R> {
    inner: R,
    buf: BytesMut,
    config: ReaderConfig,
    fragments: HashMap<u32, PacketFragment>,
    ready: VecDeque<Packet>,
    pushback: Option<Packet>,
    finished: bool,
    on_warning: Option<WarningHandler>,
}

impl<R: Read> PacketReader<R> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, ReaderConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: R, config: ReaderConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            fragments: HashMap::new(),
            ready: VecDeque::new(),
            pushback: None,
            finished: false,
            on_warning: None,
        }
    }

    /// Register a handler for recoverable anomalies.
    ///
    /// Warnings are always logged; the handler additionally receives each
    /// one as it happens.
    pub fn on_warning(&mut self, handler: impl FnMut(&ReadWarning) + 'static) {
        self.on_warning = Some(Box::new(handler));
    }

    /// Read the next packet of any logical stream.
    ///
    /// Returns `Ok(None)` at end of input, including when the input ends
    /// inside a page.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(packet) = self.pushback.take() {
            return Ok(Some(packet));
        }

        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(Some(packet));
            }
            match self.read_page()? {
                Some(page) => self.unpack(&page),
                None => return Ok(None),
            }
        }
    }

    /// Read the next packet of stream `sid`, discarding other streams.
    pub fn next_packet_with_sid(&mut self, sid: u32) -> Result<Option<Packet>> {
        while let Some(packet) = self.next_packet()? {
            if packet.sid() == Some(sid) {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }

    /// Skip to the first packet of `sid` on a page numbered `sequence` or
    /// later.
    ///
    /// Packets of every stream before it are consumed. The matching packet
    /// is pushed back, so the next [`PacketReader::next_packet`] returns it.
    /// Returns `false` if input ended first.
    pub fn skip_to_sequence_number(&mut self, sid: u32, sequence: u32) -> Result<bool> {
        self.skip_until(sid, |packet| {
            packet.sequence_number().is_some_and(|s| s >= sequence)
        })
    }

    /// Skip to the first packet of `sid` with a granule position of
    /// `granule` or later. See [`PacketReader::skip_to_sequence_number`].
    pub fn skip_to_granule_position(&mut self, sid: u32, granule: i64) -> Result<bool> {
        self.skip_until(sid, |packet| {
            packet.granule_position().is_some_and(|g| g >= granule)
        })
    }

    /// Push a packet back so the next read returns it.
    ///
    /// Only one packet can be pending at a time.
    pub fn unread_packet(&mut self, packet: Packet) -> Result<()> {
        if self.pushback.is_some() {
            return Err(StreamError::PushbackOccupied);
        }
        self.pushback = Some(packet);
        Ok(())
    }

    /// Read the next page, resynchronizing on the capture pattern first.
    ///
    /// Pages read this way bypass packet reassembly.
    pub fn read_page(&mut self) -> Result<Option<Page>> {
        if self.finished {
            return Ok(None);
        }
        if !self.sync()? {
            self.finish();
            return Ok(None);
        }

        loop {
            if let Some(page) = decode_page(&mut self.buf)? {
                debug!(
                    sid = page.sid(),
                    sequence = page.sequence_number(),
                    granule = page.granule_position(),
                    size = page.size(),
                    "loaded page"
                );
                if self.config.verify_checksums
                    && !page.is_checksum_valid(self.config.checksum_policy)
                {
                    self.warn(ReadWarning::ChecksumMismatch {
                        sid: page.sid(),
                        sequence: page.sequence_number(),
                    });
                }
                return Ok(Some(page));
            }

            if !self.fill()? {
                let buffered = self.buf.len();
                self.buf.clear();
                self.warn(ReadWarning::TruncatedPage { buffered });
                self.finish();
                return Ok(None);
            }
        }
    }

    /// Mark the input as exhausted and drop packets that never completed.
    fn finish(&mut self) {
        self.finished = true;
        let mut pending: Vec<(u32, PacketFragment)> = self.fragments.drain().collect();
        pending.sort_by_key(|(sid, _)| *sid);
        for (sid, fragment) in pending {
            self.warn(ReadWarning::DiscardedFragment {
                sid,
                bytes: fragment.len(),
            });
        }
    }

    fn skip_until(&mut self, sid: u32, reached: impl Fn(&Packet) -> bool) -> Result<bool> {
        while let Some(packet) = self.next_packet()? {
            if packet.sid() == Some(sid) && reached(&packet) {
                self.pushback = Some(packet);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn unpack(&mut self, page: &Page) {
        let sid = page.sid();
        let mut carried = self.fragments.remove(&sid);

        if !page.is_continued() {
            if let Some(stale) = carried.take() {
                self.warn(ReadWarning::DiscardedFragment {
                    sid,
                    bytes: stale.len(),
                });
            }
        }
        let orphaned = page.is_continued() && carried.is_none();

        let mut items = page.packets(carried);
        if orphaned && items.next().is_some() {
            self.warn(ReadWarning::OrphanedContinuation {
                sid,
                sequence: page.sequence_number(),
            });
        }

        for item in items {
            match item {
                PageItem::Packet(packet) => self.ready.push_back(packet),
                PageItem::Fragment(fragment) => {
                    self.fragments.insert(sid, fragment);
                }
            }
        }
    }

    /// Discard bytes up to the next capture pattern.
    ///
    /// Returns `false` if input ended first.
    fn sync(&mut self) -> Result<bool> {
        let mut skipped = 0usize;
        loop {
            if let Some(pos) = find_capture(&self.buf) {
                skipped += pos;
                if skipped > self.config.max_sync_search {
                    return Err(StreamError::SyncNotFound { skipped });
                }
                self.buf.advance(pos);
                if skipped > 0 {
                    self.warn(ReadWarning::JunkSkipped { bytes: skipped });
                }
                return Ok(true);
            }

            // Keep a tail that may be the start of a split capture pattern.
            let keep = self.buf.len().min(CAPTURE_PATTERN.len() - 1);
            let junk = self.buf.len() - keep;
            self.buf.advance(junk);
            skipped += junk;
            if skipped > self.config.max_sync_search {
                return Err(StreamError::SyncNotFound { skipped });
            }

            if !self.fill()? {
                skipped += self.buf.len();
                self.buf.clear();
                if skipped > 0 {
                    self.warn(ReadWarning::JunkSkipped { bytes: skipped });
                }
                return Ok(false);
            }
        }
    }

    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(StreamError::Io(err)),
            }
        }
    }

    fn warn(&mut self, warning: ReadWarning) {
        warn!("{warning}");
        if let Some(handler) = self.on_warning.as_mut() {
            handler(&warning);
        }
    }
}

impl<R> PacketReader<R> {
    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }
}

fn find_capture(buf: &[u8]) -> Option<usize> {
    buf.windows(CAPTURE_PATTERN.len())
        .position(|window| window == CAPTURE_PATTERN)
}
