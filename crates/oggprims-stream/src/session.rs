use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use oggprims_page::{Packet, Page};
use tracing::debug;

use crate::demux::{demultiplex, DemuxReport, StreamClassifier};
use crate::error::{Mode, Result, StreamError};
use crate::reader::{PacketReader, ReaderConfig};
use crate::serial::{SerialAllocator, SERIAL_RANGE};
use crate::writer::{PacketWriter, PageSink};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

enum Inner<S> {
    Reader(PacketReader<S>),
    Writer { sink: S, buf: BytesMut },
}

/// One physical Ogg file, open for either reading or writing.
///
/// In write mode the file is the [`PageSink`] that [`PacketWriter`]s flush
/// into, and it tracks the serial numbers handed out to them. In read mode
/// it wraps a [`PacketReader`]. Calling an operation of the other mode
/// fails with [`StreamError::WrongMode`].
pub struct OggFile<S> {
    inner: Inner<S>,
    serials: SerialAllocator,
}

impl<S: Read> OggFile<S> {
    /// Open `source` for reading with default reader configuration.
    pub fn for_reading(source: S) -> Self {
        Self::for_reading_with_config(source, ReaderConfig::default())
    }

    /// Open `source` for reading with explicit reader configuration.
    pub fn for_reading_with_config(source: S, config: ReaderConfig) -> Self {
        Self {
            inner: Inner::Reader(PacketReader::with_config(source, config)),
            serials: SerialAllocator::new(),
        }
    }

    /// Read the next packet of any logical stream.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        self.reader("read packets")?.next_packet()
    }

    /// Read the next packet of stream `sid`.
    pub fn next_packet_with_sid(&mut self, sid: u32) -> Result<Option<Packet>> {
        self.reader("read packets")?.next_packet_with_sid(sid)
    }

    /// See [`PacketReader::skip_to_sequence_number`].
    pub fn skip_to_sequence_number(&mut self, sid: u32, sequence: u32) -> Result<bool> {
        self.reader("skip packets")?
            .skip_to_sequence_number(sid, sequence)
    }

    /// See [`PacketReader::skip_to_granule_position`].
    pub fn skip_to_granule_position(&mut self, sid: u32, granule: i64) -> Result<bool> {
        self.reader("skip packets")?
            .skip_to_granule_position(sid, granule)
    }

    pub fn unread_packet(&mut self, packet: Packet) -> Result<()> {
        self.reader("unread a packet")?.unread_packet(packet)
    }

    /// Route every remaining packet through `classifier`.
    ///
    /// Runs to end of input on the caller's stack. See
    /// [`crate::demultiplex`].
    pub fn demultiplex<C>(&mut self, classifier: &mut C) -> Result<DemuxReport>
    where
        C: StreamClassifier + ?Sized,
    {
        demultiplex(self.reader("demultiplex")?, classifier)
    }

    /// The underlying packet reader, for page-level access or warning
    /// handlers.
    pub fn reader_mut(&mut self) -> Result<&mut PacketReader<S>> {
        self.reader("access the packet reader")
    }

    fn reader(&mut self, operation: &'static str) -> Result<&mut PacketReader<S>> {
        match &mut self.inner {
            Inner::Reader(reader) => Ok(reader),
            Inner::Writer { .. } => Err(StreamError::WrongMode {
                operation,
                mode: Mode::Writing,
            }),
        }
    }
}

impl<S: Write> OggFile<S> {
    /// Open `sink` for writing.
    pub fn for_writing(sink: S) -> Self {
        Self {
            inner: Inner::Writer {
                sink,
                buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            },
            serials: SerialAllocator::new(),
        }
    }

    /// Write `pages` in order, each header followed by its payload, then
    /// flush the sink once.
    pub fn write_pages(&mut self, pages: &[Page]) -> Result<()> {
        let (sink, buf) = match &mut self.inner {
            Inner::Writer { sink, buf } => (sink, buf),
            Inner::Reader(_) => {
                return Err(StreamError::WrongMode {
                    operation: "write pages",
                    mode: Mode::Reading,
                })
            }
        };

        for page in pages {
            buf.clear();
            page.encode_header(buf);
            write_all(sink, buf)?;
            write_all(sink, page.payload())?;
        }
        flush(sink)?;
        debug!(pages = pages.len(), "wrote pages");
        Ok(())
    }
}

impl<S> OggFile<S> {
    /// Which direction the file was opened for.
    pub fn mode(&self) -> Mode {
        match self.inner {
            Inner::Reader(_) => Mode::Reading,
            Inner::Writer { .. } => Mode::Writing,
        }
    }

    /// Draw a random serial number not yet issued in this file.
    pub fn unused_serial_number(&mut self) -> Result<u32> {
        self.require_writing("allocate a serial number")?;
        self.serials
            .unused_serial_number()
            .ok_or(StreamError::SerialsExhausted(SERIAL_RANGE))
    }

    /// Reserve a caller-chosen serial number.
    pub fn register_serial(&mut self, sid: u32) -> Result<()> {
        self.require_writing("register a serial number")?;
        if !self.serials.register(sid) {
            return Err(StreamError::SerialInUse(sid));
        }
        Ok(())
    }

    /// Create a writer for a new logical stream with a fresh serial number.
    pub fn new_writer(&mut self) -> Result<PacketWriter> {
        let sid = self.unused_serial_number()?;
        Ok(PacketWriter::new(sid))
    }

    /// Create a writer for a new logical stream numbered `sid`.
    pub fn writer_with_serial(&mut self, sid: u32) -> Result<PacketWriter> {
        self.register_serial(sid)?;
        Ok(PacketWriter::new(sid))
    }

    /// Consume the file and return the underlying source or sink.
    ///
    /// Bytes the reader had buffered but not yet parsed are lost.
    pub fn into_inner(self) -> S {
        match self.inner {
            Inner::Reader(reader) => reader.into_inner(),
            Inner::Writer { sink, .. } => sink,
        }
    }

    fn require_writing(&self, operation: &'static str) -> Result<()> {
        match self.mode() {
            Mode::Writing => Ok(()),
            mode => Err(StreamError::WrongMode { operation, mode }),
        }
    }
}

impl<S: Write> PageSink for OggFile<S> {
    fn write_pages(&mut self, pages: &[Page]) -> Result<()> {
        OggFile::write_pages(self, pages)
    }
}

fn write_all<W: Write>(sink: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match sink.write(&data[offset..]) {
            Ok(0) => return Err(StreamError::Io(ErrorKind::WriteZero.into())),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Io(err)),
        }
    }
    Ok(())
}

fn flush<W: Write>(sink: &mut W) -> Result<()> {
    loop {
        match sink.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use oggprims_page::{MAX_LACING_VALUES, MAX_SEGMENT_SIZE};

    use super::*;

    /// Records writes and counts flushes.
    #[derive(Default)]
    struct TrackingSink {
        bytes: Vec<u8>,
        writes: usize,
        flushes: usize,
    }

    impl Write for TrackingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            // Short writes exercise the retry loop.
            let n = buf.len().min(1000);
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
    }

    #[test]
    fn round_trip_preserves_packets_and_metadata() {
        let sizes = [
            0,
            1,
            254,
            255,
            256,
            4096,
            MAX_SEGMENT_SIZE * MAX_LACING_VALUES,
            MAX_SEGMENT_SIZE * MAX_LACING_VALUES + 1,
            170_000,
        ];

        let mut file = OggFile::for_writing(Vec::<u8>::new());
        let mut writer = file.writer_with_serial(42).unwrap();
        let mut written = Vec::new();
        for (i, len) in sizes.iter().enumerate() {
            let mut packet = Packet::new(pattern(*len, i as u8));
            if i == sizes.len() - 1 {
                packet.set_end_of_stream(true);
            }
            writer
                .buffer_packet_with_granule(&mut packet, (i as i64 + 1) * 1000)
                .unwrap();
            writer.flush(&mut file).unwrap();
            written.push(packet);
        }
        let bytes = file.into_inner();

        let mut file = OggFile::for_reading(Cursor::new(bytes));
        for expected in &written {
            let got = file.next_packet().unwrap().unwrap();
            assert_eq!(got.data(), expected.data());
            assert_eq!(got.sid(), Some(42));
            assert_eq!(got.granule_position(), expected.granule_position());
            assert_eq!(got.sequence_number(), expected.sequence_number());
            assert_eq!(
                got.is_beginning_of_stream(),
                expected.is_beginning_of_stream()
            );
            assert_eq!(got.is_end_of_stream(), expected.is_end_of_stream());
        }
        assert!(written[0].is_beginning_of_stream());
        assert!(file.next_packet().unwrap().is_none());
    }

    #[test]
    fn interleaved_streams_can_be_filtered() {
        let mut file = OggFile::for_writing(Vec::<u8>::new());
        let mut one = file.writer_with_serial(1).unwrap();
        let mut two = file.writer_with_serial(2).unwrap();

        for i in 0..4u8 {
            one.buffer_packet(&mut Packet::new(vec![b'a', i])).unwrap();
            one.flush(&mut file).unwrap();
            two.buffer_packet(&mut Packet::new(vec![b'b', i])).unwrap();
            two.flush(&mut file).unwrap();
        }
        one.close(&mut file).unwrap();
        two.close(&mut file).unwrap();

        let mut file = OggFile::for_reading(Cursor::new(file.into_inner()));
        let mut seen = Vec::new();
        while let Some(packet) = file.next_packet_with_sid(2).unwrap() {
            assert_eq!(packet.sid(), Some(2));
            seen.push(packet.into_data().to_vec());
        }
        assert_eq!(
            seen,
            vec![
                vec![b'b', 0],
                vec![b'b', 1],
                vec![b'b', 2],
                vec![b'b', 3],
                Vec::new(),
            ]
        );
    }

    #[test]
    fn write_pages_flushes_once() {
        let mut file = OggFile::for_writing(TrackingSink::default());
        let mut writer = file.new_writer().unwrap();
        writer.buffer_packet(&mut Packet::new(pattern(200_000, 9))).unwrap();
        let pages = writer.pending_pages().len();
        assert!(pages > 1);
        let expected: usize = writer.size_pending_flush();

        writer.flush(&mut file).unwrap();
        let sink = file.into_inner();
        assert_eq!(sink.flushes, 1);
        assert!(sink.writes > pages * 2);
        assert_eq!(sink.bytes.len(), expected);
        assert_eq!(&sink.bytes[..4], b"OggS");
    }

    #[test]
    fn wrong_mode_operations_fail() {
        let mut reading = OggFile::for_reading(Cursor::new(Vec::<u8>::new()));
        assert_eq!(reading.mode(), Mode::Reading);
        assert!(matches!(
            reading.write_pages(&[]),
            Err(StreamError::WrongMode {
                mode: Mode::Reading,
                ..
            })
        ));
        assert!(matches!(
            reading.new_writer(),
            Err(StreamError::WrongMode { .. })
        ));
        assert!(matches!(
            reading.register_serial(3),
            Err(StreamError::WrongMode { .. })
        ));

        let mut writing = OggFile::for_writing(Cursor::new(Vec::<u8>::new()));
        assert_eq!(writing.mode(), Mode::Writing);
        let err = writing.next_packet().unwrap_err();
        assert_eq!(err.to_string(), "cannot read packets: file is open for writing");
        assert!(matches!(
            writing.unread_packet(Packet::new(Vec::<u8>::new())),
            Err(StreamError::WrongMode {
                mode: Mode::Writing,
                ..
            })
        ));
    }

    #[test]
    fn serial_numbers_are_unique_per_file() {
        let mut file = OggFile::for_writing(Vec::<u8>::new());
        let first = file.new_writer().unwrap();
        let second = file.new_writer().unwrap();
        assert_ne!(first.sid(), second.sid());

        assert!(matches!(
            file.writer_with_serial(first.sid()),
            Err(StreamError::SerialInUse(sid)) if sid == first.sid()
        ));
        file.register_serial(40_000).unwrap();
        assert!(matches!(
            file.register_serial(40_000),
            Err(StreamError::SerialInUse(40_000))
        ));
    }

    #[test]
    fn new_writer_fails_once_serials_run_out() {
        let mut file = OggFile::for_writing(Vec::<u8>::new());
        for sid in 0..SERIAL_RANGE {
            file.register_serial(sid).unwrap();
        }
        let err = file.new_writer().unwrap_err();
        assert!(matches!(err, StreamError::SerialsExhausted(SERIAL_RANGE)));
        assert_eq!(err.to_string(), "all 32768 serial numbers are in use");

        // Explicit numbers outside the random range still work.
        assert_eq!(file.writer_with_serial(SERIAL_RANGE).unwrap().sid(), SERIAL_RANGE);
    }

    #[test]
    fn into_inner_returns_the_reading_source() {
        let mut file = OggFile::for_writing(Vec::<u8>::new());
        let mut writer = file.writer_with_serial(3).unwrap();
        writer.buffer_packet(&mut Packet::new(&b"only"[..])).unwrap();
        writer.flush(&mut file).unwrap();
        let bytes = file.into_inner();

        let mut file = OggFile::for_reading(Cursor::new(bytes.clone()));
        assert_eq!(file.next_packet().unwrap().unwrap().data().as_ref(), b"only");
        let source = file.into_inner();
        assert_eq!(source.get_ref(), &bytes);
        assert_eq!(source.position(), bytes.len() as u64);
    }

    #[test]
    fn skip_then_read_through_the_file() {
        let mut file = OggFile::for_writing(Vec::<u8>::new());
        let mut writer = file.writer_with_serial(8).unwrap();
        for granule in [100, 200, 300] {
            writer
                .buffer_packet_with_granule(&mut Packet::new(vec![granule as u8]), granule)
                .unwrap();
            writer.flush(&mut file).unwrap();
        }

        let mut file = OggFile::for_reading(Cursor::new(file.into_inner()));
        assert!(file.skip_to_granule_position(8, 150).unwrap());
        let packet = file.next_packet().unwrap().unwrap();
        assert_eq!(packet.granule_position(), Some(200));

        file.unread_packet(packet).unwrap();
        assert!(file.skip_to_sequence_number(8, 2).unwrap());
        assert_eq!(file.next_packet().unwrap().unwrap().data().as_ref(), &[44]);
    }
}
