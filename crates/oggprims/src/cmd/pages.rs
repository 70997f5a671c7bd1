use oggprims_page::{ChecksumPolicy, Page};
use serde::Serialize;

use crate::cmd::PagesArgs;
use crate::exit::{stream_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{flag_list, print_json, table_with_header, OutputFormat};

#[derive(Serialize)]
struct PageRow {
    sid: u32,
    sequence: u32,
    granule_position: i64,
    continued: bool,
    bos: bool,
    eos: bool,
    segments: usize,
    packets: usize,
    size: usize,
    checksum_valid: bool,
}

impl PageRow {
    fn new(page: &Page, policy: ChecksumPolicy) -> Self {
        Self {
            sid: page.sid(),
            sequence: page.sequence_number(),
            granule_position: page.granule_position(),
            continued: page.is_continued(),
            bos: page.is_beginning_of_stream(),
            eos: page.is_end_of_stream(),
            segments: page.lacing().len(),
            packets: page.packet_count(),
            size: page.size(),
            checksum_valid: page.is_checksum_valid(policy),
        }
    }
}

#[derive(Serialize)]
struct PagesOutput {
    schema_id: &'static str,
    path: String,
    count: usize,
    pages: Vec<PageRow>,
}

pub fn run(args: PagesArgs, format: OutputFormat) -> CliResult<i32> {
    if args.limit == Some(0) {
        return Err(CliError::new(USAGE, "--limit must be greater than zero"));
    }
    let policy = args.input.checksum_policy();
    let mut reader = args.input.open()?;

    let mut pages = Vec::new();
    while let Some(page) = reader
        .read_page()
        .map_err(|err| stream_error("read failed", err))?
    {
        if args.sid.is_some_and(|sid| sid != page.sid()) {
            continue;
        }
        pages.push(PageRow::new(&page, policy));
        if args.limit.is_some_and(|limit| pages.len() >= limit) {
            break;
        }
    }

    let out = PagesOutput {
        schema_id: "https://schemas.3leaps.dev/oggprims/cli/v1/page-listing.schema.json",
        path: args.input.path.display().to_string(),
        count: pages.len(),
        pages,
    };
    print_pages(&out, format);
    Ok(SUCCESS)
}

fn print_pages(out: &PagesOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = table_with_header(vec![
                "SID", "SEQ", "GRANULE", "FLAGS", "SEGMENTS", "PACKETS", "SIZE", "CRC",
            ]);
            for row in &out.pages {
                table.add_row(vec![
                    row.sid.to_string(),
                    row.sequence.to_string(),
                    row.granule_position.to_string(),
                    flag_list(row.continued, row.bos, row.eos),
                    row.segments.to_string(),
                    row.packets.to_string(),
                    row.size.to_string(),
                    if row.checksum_valid { "ok" } else { "BAD" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &out.pages {
                println!(
                    "sid={} seq={} granule={} flags={} segments={} packets={} size={} crc={}",
                    row.sid,
                    row.sequence,
                    row.granule_position,
                    flag_list(row.continued, row.bos, row.eos),
                    row.segments,
                    row.packets,
                    row.size,
                    if row.checksum_valid { "ok" } else { "bad" }
                );
            }
            println!("{} pages", out.count);
        }
    }
}
