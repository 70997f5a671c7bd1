use std::cell::RefCell;
use std::rc::Rc;

use oggprims_page::Packet;
use oggprims_stream::{demultiplex, PacketSink, StreamClassifier};
use serde::Serialize;

use crate::cmd::StreamsArgs;
use crate::exit::{stream_error, CliResult, SUCCESS};
use crate::output::{print_json, table_with_header, OutputFormat};

#[derive(Serialize, Clone, Debug, PartialEq)]
struct StreamSummary {
    sid: u32,
    codec: &'static str,
    packets: u64,
    bytes: u64,
    last_granule_position: i64,
    last_sequence: u32,
    starts_with_bos: bool,
    ended: bool,
}

/// Tallies one logical stream.
struct Tally(Rc<RefCell<StreamSummary>>);

impl PacketSink for Tally {
    fn on_packet(&mut self, packet: &Packet) -> oggprims_stream::Result<()> {
        let mut summary = self.0.borrow_mut();
        summary.packets += 1;
        summary.bytes += packet.len() as u64;
        if let Some(page) = packet.page() {
            summary.last_granule_position = page.granule_position;
            summary.last_sequence = page.sequence_number;
        }
        Ok(())
    }

    fn on_stream_end(&mut self, _sid: u32) -> oggprims_stream::Result<()> {
        self.0.borrow_mut().ended = true;
        Ok(())
    }
}

/// Gives every stream a tally, in order of appearance.
#[derive(Default)]
struct Census {
    streams: Vec<Rc<RefCell<StreamSummary>>>,
}

impl StreamClassifier for Census {
    fn classify(&mut self, first: &Packet) -> Vec<Box<dyn PacketSink>> {
        let page = first.page();
        let summary = Rc::new(RefCell::new(StreamSummary {
            sid: first.sid().unwrap_or_default(),
            codec: identify_codec(first.data()),
            packets: 1,
            bytes: first.len() as u64,
            last_granule_position: page.map_or(0, |p| p.granule_position),
            last_sequence: page.map_or(0, |p| p.sequence_number),
            starts_with_bos: first.is_beginning_of_stream(),
            ended: false,
        }));
        self.streams.push(Rc::clone(&summary));
        vec![Box::new(Tally(summary))]
    }
}

/// Name the codec from the magic of a stream's identification header.
fn identify_codec(header: &[u8]) -> &'static str {
    const SIGNATURES: [(&[u8], &str); 6] = [
        (b"\x01vorbis", "vorbis"),
        (b"OpusHead", "opus"),
        (b"\x7fFLAC", "flac"),
        (b"Speex   ", "speex"),
        (b"\x80theora", "theora"),
        (b"fishead\0", "skeleton"),
    ];
    SIGNATURES
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map_or("unknown", |(_, name)| *name)
}

#[derive(Serialize)]
struct StreamsOutput {
    schema_id: &'static str,
    path: String,
    packets: u64,
    streams: Vec<StreamSummary>,
}

pub fn run(args: StreamsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut reader = args.input.open()?;
    let mut census = Census::default();
    let report =
        demultiplex(&mut reader, &mut census).map_err(|err| stream_error("read failed", err))?;

    let out = StreamsOutput {
        schema_id: "https://schemas.3leaps.dev/oggprims/cli/v1/stream-summary.schema.json",
        path: args.input.path.display().to_string(),
        packets: report.packets,
        streams: census
            .streams
            .iter()
            .map(|summary| summary.borrow().clone())
            .collect(),
    };
    print_streams(&out, format);
    Ok(SUCCESS)
}

fn print_streams(out: &StreamsOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = table_with_header(vec![
                "SID", "CODEC", "PACKETS", "BYTES", "GRANULE", "LAST SEQ", "ENDED",
            ]);
            for s in &out.streams {
                table.add_row(vec![
                    s.sid.to_string(),
                    s.codec.to_string(),
                    s.packets.to_string(),
                    s.bytes.to_string(),
                    s.last_granule_position.to_string(),
                    s.last_sequence.to_string(),
                    if s.ended { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}: {} packets", out.path, out.packets);
            for s in &out.streams {
                println!(
                    "  stream {} ({}): {} packets, {} bytes, granule {}{}",
                    s.sid,
                    s.codec,
                    s.packets,
                    s.bytes,
                    s.last_granule_position,
                    if s.ended { "" } else { ", no end-of-stream" }
                );
            }
        }
    }
}
