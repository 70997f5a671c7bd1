//! Push-based demultiplexing.
//!
//! A single loop pulls packets from a [`PacketReader`] and fans each one out
//! to the sinks registered for its logical stream. Sinks are chosen by a
//! [`StreamClassifier`] when a stream's first packet is seen. The sid→sink
//! map lives only for the duration of the loop.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Read;

use oggprims_page::Packet;
use tracing::debug;

use crate::error::Result;
use crate::reader::PacketReader;

/// Receives the packets of one logical stream.
pub trait PacketSink {
    /// Called for every packet after the stream's first.
    fn on_packet(&mut self, packet: &Packet) -> Result<()>;

    /// Called after the end-of-stream packet has been delivered.
    ///
    /// Also called when the stream's first packet carries end-of-stream.
    /// The first packet only goes to the classifier, so in that case no
    /// `on_packet` call precedes this one.
    fn on_stream_end(&mut self, _sid: u32) -> Result<()> {
        Ok(())
    }
}

/// Picks the sinks for a newly seen logical stream.
pub trait StreamClassifier {
    /// Inspect a stream's first packet and return its sinks.
    ///
    /// The first packet is not delivered to the returned sinks. Returning
    /// no sinks ignores the stream.
    fn classify(&mut self, first: &Packet) -> Vec<Box<dyn PacketSink>>;

    /// Called when a stream's end-of-stream packet has been processed.
    fn stream_ended(&mut self, _sid: u32) {}
}

/// Totals from one demultiplexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxReport {
    /// Serial numbers in the order their first packet was seen.
    pub streams: Vec<u32>,
    /// Packets read, including each stream's first packet.
    pub packets: u64,
    /// Packets handed to at least one sink.
    pub delivered: u64,
    /// Packets of streams that have no sinks.
    pub unrouted: u64,
}

/// Run `reader` to end of input, routing packets through `classifier`.
///
/// A stream's sinks are dropped after its end-of-stream packet, so a
/// later packet with the same serial number starts a new stream.
pub fn demultiplex<R, C>(reader: &mut PacketReader<R>, classifier: &mut C) -> Result<DemuxReport>
where
    R: Read,
    C: StreamClassifier + ?Sized,
{
    let mut sinks: HashMap<u32, Vec<Box<dyn PacketSink>>> = HashMap::new();
    let mut report = DemuxReport::default();

    while let Some(packet) = reader.next_packet()? {
        let Some(sid) = packet.sid() else {
            continue;
        };
        report.packets += 1;

        match sinks.entry(sid) {
            Entry::Vacant(slot) => {
                let targets = classifier.classify(&packet);
                debug!(sid, sinks = targets.len(), "new logical stream");
                report.streams.push(sid);
                slot.insert(targets);
            }
            Entry::Occupied(mut slot) => {
                let targets = slot.get_mut();
                if targets.is_empty() {
                    report.unrouted += 1;
                } else {
                    for sink in targets.iter_mut() {
                        sink.on_packet(&packet)?;
                    }
                    report.delivered += 1;
                }
            }
        }

        if packet.is_end_of_stream() {
            if let Some(mut targets) = sinks.remove(&sid) {
                for sink in targets.iter_mut() {
                    sink.on_stream_end(sid)?;
                }
            }
            classifier.stream_ended(sid);
            debug!(sid, "logical stream ended");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use bytes::Bytes;
    use oggprims_page::Page;

    use super::*;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Log>>,
    }

    impl PacketSink for Recorder {
        fn on_packet(&mut self, packet: &Packet) -> Result<()> {
            self.log.borrow_mut().events.push(format!(
                "{}:{}",
                self.name,
                String::from_utf8_lossy(packet.data())
            ));
            Ok(())
        }

        fn on_stream_end(&mut self, sid: u32) -> Result<()> {
            self.log
                .borrow_mut()
                .events
                .push(format!("{}:end({sid})", self.name));
            Ok(())
        }
    }

    /// Routes streams whose first packet starts with "audio" to two sinks
    /// and ignores everything else.
    struct ByMagic {
        log: Rc<RefCell<Log>>,
        ended: Vec<u32>,
    }

    impl StreamClassifier for ByMagic {
        fn classify(&mut self, first: &Packet) -> Vec<Box<dyn PacketSink>> {
            if !first.data().starts_with(b"audio") {
                return Vec::new();
            }
            vec![
                Box::new(Recorder {
                    name: "a",
                    log: Rc::clone(&self.log),
                }),
                Box::new(Recorder {
                    name: "b",
                    log: Rc::clone(&self.log),
                }),
            ]
        }

        fn stream_ended(&mut self, sid: u32) {
            self.ended.push(sid);
        }
    }

    fn page(sid: u32, sequence: u32, data: &[&str], eos: bool) -> Page {
        let mut page = Page::new(sid, sequence);
        for text in data {
            let mut packet = Packet::new(Bytes::copy_from_slice(text.as_bytes()));
            packet.set_end_of_stream(eos);
            page.add_packet(&packet, 0);
        }
        page
    }

    fn wire(pages: &[Page]) -> Vec<u8> {
        let mut out = Vec::new();
        for page in pages {
            page.write_to(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn fans_out_to_registered_sinks() {
        let bytes = wire(&[
            page(1, 0, &["audio-header"], false),
            page(2, 0, &["video-header"], false),
            page(1, 1, &["s1", "s2"], false),
            page(2, 1, &["frame"], false),
            page(1, 2, &["s3"], true),
        ]);
        let log = Rc::new(RefCell::new(Log::default()));
        let mut classifier = ByMagic {
            log: Rc::clone(&log),
            ended: Vec::new(),
        };

        let mut reader = PacketReader::new(Cursor::new(bytes));
        let report = demultiplex(&mut reader, &mut classifier).unwrap();

        assert_eq!(
            log.borrow().events,
            vec!["a:s1", "b:s1", "a:s2", "b:s2", "a:s3", "b:s3", "a:end(1)", "b:end(1)"]
        );
        assert_eq!(classifier.ended, vec![1]);
        assert_eq!(
            report,
            DemuxReport {
                streams: vec![1, 2],
                packets: 6,
                delivered: 3,
                unrouted: 1,
            }
        );
    }

    #[test]
    fn serial_reused_after_eos_is_a_new_stream() {
        let bytes = wire(&[
            page(5, 0, &["audio-one"], true),
            page(5, 0, &["audio-two"], false),
            page(5, 1, &["payload"], false),
        ]);
        let log = Rc::new(RefCell::new(Log::default()));
        let mut classifier = ByMagic {
            log: Rc::clone(&log),
            ended: Vec::new(),
        };

        let mut reader = PacketReader::new(Cursor::new(bytes));
        let report = demultiplex(&mut reader, &mut classifier).unwrap();

        assert_eq!(report.streams, vec![5, 5]);
        assert_eq!(classifier.ended, vec![5]);
        assert_eq!(
            log.borrow().events,
            vec!["a:end(5)", "b:end(5)", "a:payload", "b:payload"]
        );
    }

    #[test]
    fn sink_errors_stop_the_loop() {
        struct Failing;

        impl PacketSink for Failing {
            fn on_packet(&mut self, _packet: &Packet) -> Result<()> {
                Err(std::io::Error::other("sink full").into())
            }
        }

        struct AlwaysFailing;

        impl StreamClassifier for AlwaysFailing {
            fn classify(&mut self, _first: &Packet) -> Vec<Box<dyn PacketSink>> {
                vec![Box::new(Failing)]
            }
        }

        let bytes = wire(&[page(1, 0, &["h", "p"], false)]);
        let mut reader = PacketReader::new(Cursor::new(bytes));
        let err = demultiplex(&mut reader, &mut AlwaysFailing).unwrap_err();
        assert!(err.to_string().contains("sink full"));
    }
}
