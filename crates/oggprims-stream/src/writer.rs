use bytes::Bytes;
use oggprims_page::{Laced, Packet, Page, PageInfo};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Destination for finished pages.
pub trait PageSink {
    /// Write `pages` in order, each header followed by its payload.
    fn write_pages(&mut self, pages: &[Page]) -> Result<()>;
}

/// Buffers the packets of one logical stream into pages.
///
/// Packets are laced into pages as they are buffered; nothing is written
/// until [`PacketWriter::flush`] or [`PacketWriter::close`], so the caller
/// decides page boundaries by choosing when to flush.
///
/// Every page touched by a buffer call is stamped with that call's granule
/// position, and a later call can restamp a still-buffered page. Flush
/// after each packet when each page needs its own granule position.
#[derive(Debug)]
pub struct PacketWriter {
    sid: u32,
    sequence_number: u32,
    granule_position: i64,
    done_first_packet: bool,
    pages: Vec<Page>,
    closed: bool,
}

impl PacketWriter {
    /// Create a writer for logical stream `sid`.
    pub fn new(sid: u32) -> Self {
        Self {
            sid,
            sequence_number: 0,
            granule_position: 0,
            done_first_packet: false,
            pages: Vec::new(),
            closed: false,
        }
    }

    pub fn sid(&self) -> u32 {
        self.sid
    }

    /// Sequence number the next new page will get.
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Granule position used when none is given.
    pub fn granule_position(&self) -> i64 {
        self.granule_position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Buffer a packet at the current granule position.
    pub fn buffer_packet(&mut self, packet: &mut Packet) -> Result<()> {
        self.buffer_packet_with_granule(packet, self.granule_position)
    }

    /// Buffer a packet, stamping every page it touches with `granule`.
    ///
    /// The first packet ever buffered is marked beginning-of-stream. On
    /// return the packet records the page it ends on.
    pub fn buffer_packet_with_granule(&mut self, packet: &mut Packet, granule: i64) -> Result<()> {
        if self.closed {
            return Err(StreamError::WriterClosed(self.sid));
        }
        if !self.done_first_packet {
            packet.set_beginning_of_stream(true);
            self.done_first_packet = true;
        }

        let mut index = self.open_page();
        let mut offset = 0;
        let segments = loop {
            let page = &mut self.pages[index];
            page.set_granule_position(granule);
            let before = page.lacing().len();
            match page.add_packet(packet, offset) {
                Laced::Complete => break page.lacing().len() - before,
                Laced::Partial(next) => {
                    offset = next;
                    index = self.start_page();
                }
            }
        };
        self.granule_position = granule;

        let page = &self.pages[index];
        let lacing_len = page.lacing().len();
        packet.set_page(PageInfo {
            sid: self.sid,
            granule_position: granule,
            sequence_number: page.sequence_number(),
            overhead_bytes: (page.header_size() * segments + lacing_len / 2) / lacing_len,
        });
        debug!(
            sid = self.sid,
            len = packet.len(),
            sequence = page.sequence_number(),
            granule,
            "buffered packet"
        );
        Ok(())
    }

    /// Restamp every buffered page and make `granule` the default.
    pub fn set_granule_position(&mut self, granule: i64) {
        for page in &mut self.pages {
            page.set_granule_position(granule);
        }
        self.granule_position = granule;
    }

    /// Bytes that the next flush would write.
    pub fn size_pending_flush(&self) -> usize {
        self.pages.iter().map(Page::size).sum()
    }

    /// Size of the page that new packets are laced into, or 0 if none.
    pub fn current_page_size(&self) -> usize {
        self.pages.last().map_or(0, Page::size)
    }

    /// Pages buffered since the last flush.
    pub fn pending_pages(&self) -> &[Page] {
        &self.pages
    }

    /// Write all buffered pages to `sink`.
    pub fn flush(&mut self, sink: &mut impl PageSink) -> Result<()> {
        if self.closed {
            return Err(StreamError::WriterClosed(self.sid));
        }
        if self.pages.is_empty() {
            return Ok(());
        }

        sink.write_pages(&self.pages)?;
        debug!(sid = self.sid, pages = self.pages.len(), "flushed pages");
        self.pages.clear();
        Ok(())
    }

    /// Mark end-of-stream, flush, and refuse further packets.
    ///
    /// The last buffered page gets the end-of-stream flag; with nothing
    /// buffered, an empty end-of-stream packet is written instead.
    pub fn close(&mut self, sink: &mut impl PageSink) -> Result<()> {
        if self.closed {
            return Err(StreamError::WriterClosed(self.sid));
        }

        if let Some(last) = self.pages.last_mut() {
            last.set_end_of_stream(true);
        } else {
            let mut eos = Packet::new(Bytes::new()).with_end_of_stream();
            self.buffer_packet(&mut eos)?;
        }

        self.flush(sink)?;
        self.closed = true;
        debug!(sid = self.sid, "closed stream");
        Ok(())
    }

    fn open_page(&mut self) -> usize {
        let has_room = self.pages.last().is_some_and(|page| page.has_space_for(0));
        if has_room {
            self.pages.len() - 1
        } else {
            self.start_page()
        }
    }

    fn start_page(&mut self) -> usize {
        self.pages.push(Page::new(self.sid, self.sequence_number));
        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.pages.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use oggprims_page::{PageItem, MAX_LACING_VALUES, MAX_SEGMENT_SIZE};

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        pages: Vec<Page>,
        calls: usize,
    }

    impl PageSink for CollectingSink {
        fn write_pages(&mut self, pages: &[Page]) -> Result<()> {
            self.pages.extend_from_slice(pages);
            self.calls += 1;
            Ok(())
        }
    }

    fn packet(len: usize) -> Packet {
        Packet::new(vec![0xEEu8; len])
    }

    #[test]
    fn first_packet_is_beginning_of_stream() {
        let mut writer = PacketWriter::new(12);
        let mut first = packet(3);
        let mut second = packet(4);

        writer.buffer_packet(&mut first).unwrap();
        writer.buffer_packet(&mut second).unwrap();

        assert!(first.is_beginning_of_stream());
        assert!(!second.is_beginning_of_stream());
        assert_eq!(writer.pending_pages().len(), 1);
        assert!(writer.pending_pages()[0].is_beginning_of_stream());
    }

    #[test]
    fn spanning_first_packet_sets_bos_on_first_page_only() {
        let mut writer = PacketWriter::new(12);
        writer.buffer_packet(&mut packet(70_000)).unwrap();

        let pages = writer.pending_pages();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_beginning_of_stream());
        assert!(!pages[1].is_beginning_of_stream());
        assert!(pages[1].is_continued());
    }

    #[test]
    fn buffered_packet_records_its_page() {
        let mut writer = PacketWriter::new(12);
        let mut p = packet(10);
        writer.buffer_packet_with_granule(&mut p, 480).unwrap();

        assert_eq!(p.sid(), Some(12));
        assert_eq!(p.granule_position(), Some(480));
        assert_eq!(p.sequence_number(), Some(0));
        assert_eq!(p.overhead_bytes(), Some(28));
        assert_eq!(writer.granule_position(), 480);
    }

    #[test]
    fn large_packet_spans_pages() {
        let mut writer = PacketWriter::new(1);
        let len = MAX_SEGMENT_SIZE * MAX_LACING_VALUES * 2 + 10;
        let mut big = packet(len);
        writer.buffer_packet_with_granule(&mut big, 77).unwrap();

        let pages = writer.pending_pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(Page::sequence_number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(!pages[0].is_continued());
        assert!(pages[1].is_continued());
        assert!(pages[2].is_continued());
        assert!(pages.iter().all(|p| p.granule_position() == 77));
        assert_eq!(pages[2].lacing(), &[10]);
        assert_eq!(big.sequence_number(), Some(2));
        assert_eq!(writer.sequence_number(), 3);
    }

    #[test]
    fn packets_share_a_page_until_full() {
        let mut writer = PacketWriter::new(1);
        for _ in 0..MAX_LACING_VALUES {
            writer.buffer_packet(&mut packet(1)).unwrap();
        }
        assert_eq!(writer.pending_pages().len(), 1);

        writer.buffer_packet(&mut packet(1)).unwrap();
        assert_eq!(writer.pending_pages().len(), 2);
        assert!(!writer.pending_pages()[1].is_continued());
    }

    #[test]
    fn set_granule_position_restamps_buffered_pages() {
        let mut writer = PacketWriter::new(1);
        writer.buffer_packet_with_granule(&mut packet(100_000), 5).unwrap();
        writer.set_granule_position(9_000);

        assert!(writer
            .pending_pages()
            .iter()
            .all(|p| p.granule_position() == 9_000));

        let mut next = packet(1);
        writer.buffer_packet(&mut next).unwrap();
        assert_eq!(next.granule_position(), Some(9_000));
    }

    #[test]
    fn sizes_track_buffered_pages() {
        let mut writer = PacketWriter::new(1);
        assert_eq!(writer.size_pending_flush(), 0);
        assert_eq!(writer.current_page_size(), 0);

        writer.buffer_packet(&mut packet(300)).unwrap();
        assert_eq!(writer.current_page_size(), 27 + 2 + 300);
        assert_eq!(writer.size_pending_flush(), 27 + 2 + 300);

        writer.buffer_packet(&mut packet(MAX_SEGMENT_SIZE * MAX_LACING_VALUES)).unwrap();
        assert_eq!(writer.pending_pages().len(), 2);
        // 253 free lacing values on the first page leave 510 bytes for the second
        assert_eq!(writer.current_page_size(), 27 + 3 + 510);
    }

    #[test]
    fn flush_writes_in_order_and_clears() {
        let mut writer = PacketWriter::new(4);
        let mut sink = CollectingSink::default();

        writer.buffer_packet(&mut packet(70_000)).unwrap();
        writer.flush(&mut sink).unwrap();
        assert_eq!(sink.calls, 1);
        assert_eq!(sink.pages.len(), 2);
        assert_eq!(writer.size_pending_flush(), 0);

        writer.buffer_packet(&mut packet(1)).unwrap();
        writer.flush(&mut sink).unwrap();
        assert_eq!(sink.pages[2].sequence_number(), 2);

        writer.flush(&mut sink).unwrap();
        assert_eq!(sink.calls, 2);
    }

    #[test]
    fn close_marks_last_buffered_page() {
        let mut writer = PacketWriter::new(4);
        let mut sink = CollectingSink::default();

        writer.buffer_packet(&mut packet(8)).unwrap();
        writer.buffer_packet(&mut packet(9)).unwrap();
        writer.close(&mut sink).unwrap();

        assert_eq!(sink.pages.len(), 1);
        assert!(sink.pages[0].is_end_of_stream());
        assert!(writer.is_closed());
    }

    #[test]
    fn close_with_empty_buffer_writes_eos_packet() {
        let mut writer = PacketWriter::new(4);
        let mut sink = CollectingSink::default();

        writer.buffer_packet(&mut packet(8)).unwrap();
        writer.flush(&mut sink).unwrap();
        writer.close(&mut sink).unwrap();

        assert_eq!(sink.pages.len(), 2);
        let last = &sink.pages[1];
        assert!(last.is_end_of_stream());
        assert!(!last.is_beginning_of_stream());
        assert_eq!(last.lacing(), &[0]);

        let items: Vec<_> = last.packets(None).collect();
        let [PageItem::Packet(eos)] = items.as_slice() else {
            panic!("expected one packet");
        };
        assert!(eos.is_empty());
        assert!(eos.is_end_of_stream());
    }

    #[test]
    fn closed_writer_rejects_everything() {
        let mut writer = PacketWriter::new(4);
        let mut sink = CollectingSink::default();
        writer.close(&mut sink).unwrap();

        assert!(matches!(
            writer.buffer_packet(&mut packet(1)),
            Err(StreamError::WriterClosed(4))
        ));
        assert!(matches!(
            writer.flush(&mut sink),
            Err(StreamError::WriterClosed(4))
        ));
        assert!(matches!(
            writer.close(&mut sink),
            Err(StreamError::WriterClosed(4))
        ));
    }
}
