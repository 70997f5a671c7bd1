//! Multiplexing example: writes two logical streams into one Ogg file and
//! reads them back through the push-based demultiplexer.
//!
//! Run with:
//!   cargo run --example mux-two-streams

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};

use oggprims::page::Packet;
use oggprims::stream::{self, OggFile, PacketSink, StreamClassifier};

struct Printer {
    sid: u32,
}

impl PacketSink for Printer {
    fn on_packet(&mut self, packet: &Packet) -> stream::Result<()> {
        eprintln!(
            "[sid {}] {} bytes, granule {:?}",
            self.sid,
            packet.len(),
            packet.granule_position()
        );
        Ok(())
    }

    fn on_stream_end(&mut self, sid: u32) -> stream::Result<()> {
        eprintln!("[sid {sid}] end of stream");
        Ok(())
    }
}

struct ByHeader;

impl StreamClassifier for ByHeader {
    fn classify(&mut self, first: &Packet) -> Vec<Box<dyn PacketSink>> {
        let sid = first.sid().unwrap_or_default();
        eprintln!(
            "[sid {sid}] new stream, header {:?}",
            String::from_utf8_lossy(first.data())
        );
        vec![Box::new(Printer { sid })]
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("oggprims-mux-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path = dir.join("two-streams.ogg");

    let mut file = OggFile::for_writing(BufWriter::new(File::create(&path)?));
    let mut left = file.new_writer()?;
    let mut right = file.new_writer()?;

    left.buffer_packet(&mut Packet::new(&b"left-header"[..]))?;
    left.flush(&mut file)?;
    right.buffer_packet(&mut Packet::new(&b"right-header"[..]))?;
    right.flush(&mut file)?;

    for step in 1..=3i64 {
        left.buffer_packet_with_granule(&mut Packet::new(vec![1u8; 3000]), step * 1024)?;
        left.flush(&mut file)?;
        // A packet larger than one page: spans several continued pages.
        right.buffer_packet_with_granule(&mut Packet::new(vec![2u8; 70_000]), step * 512)?;
        right.flush(&mut file)?;
    }
    left.close(&mut file)?;
    right.close(&mut file)?;
    drop(file.into_inner());

    let mut file = OggFile::for_reading(BufReader::new(File::open(&path)?));
    let report = file.demultiplex(&mut ByHeader)?;
    eprintln!(
        "streams={:?} packets={} delivered={}",
        report.streams, report.packets, report.delivered
    );

    fs::remove_dir_all(&dir)?;
    Ok(())
}
