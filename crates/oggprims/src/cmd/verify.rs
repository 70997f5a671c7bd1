use std::cell::RefCell;
use std::rc::Rc;

use oggprims_stream::{ReadWarning, ReaderConfig};
use serde::Serialize;

use crate::cmd::VerifyArgs;
use crate::exit::{stream_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_json, table_with_header, OutputFormat};

#[derive(Serialize)]
struct BadPage {
    sid: u32,
    sequence: u32,
    stored: String,
    computed: String,
}

#[derive(Serialize)]
struct VerifyOutput {
    schema_id: &'static str,
    path: String,
    pages: u64,
    invalid: Vec<BadPage>,
    truncated: bool,
    warnings: Vec<String>,
    valid: bool,
}

pub fn run(args: VerifyArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = args.input.checksum_policy();
    // Mismatches are collected below rather than logged per page.
    let mut reader = args.input.open_with(ReaderConfig {
        verify_checksums: false,
        ..args.input.reader_config()
    })?;

    let warnings = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&warnings);
    reader.on_warning(move |warning: &ReadWarning| seen.borrow_mut().push(warning.clone()));

    let mut pages = 0u64;
    let mut invalid = Vec::new();
    while let Some(page) = reader
        .read_page()
        .map_err(|err| stream_error("read failed", err))?
    {
        pages += 1;
        if !page.is_checksum_valid(policy) {
            invalid.push(BadPage {
                sid: page.sid(),
                sequence: page.sequence_number(),
                stored: format!("{:08x}", page.checksum()),
                computed: format!("{:08x}", page.compute_checksum()),
            });
        }
    }

    let warnings = warnings.borrow();
    let truncated = warnings
        .iter()
        .any(|w| matches!(w, ReadWarning::TruncatedPage { .. }));
    let valid = invalid.is_empty() && !truncated;
    let out = VerifyOutput {
        schema_id: "https://schemas.3leaps.dev/oggprims/cli/v1/verify-report.schema.json",
        path: args.input.path.display().to_string(),
        pages,
        invalid,
        truncated,
        warnings: warnings.iter().map(ToString::to_string).collect(),
        valid,
    };
    print_report(&out, format);

    Ok(if valid { SUCCESS } else { DATA_INVALID })
}

fn print_report(out: &VerifyOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            println!("{}: {} pages checked", out.path, out.pages);
            if !out.invalid.is_empty() {
                let mut table = table_with_header(vec!["SID", "SEQ", "STORED", "COMPUTED"]);
                for bad in &out.invalid {
                    table.add_row(vec![
                        bad.sid.to_string(),
                        bad.sequence.to_string(),
                        bad.stored.clone(),
                        bad.computed.clone(),
                    ]);
                }
                println!("{table}");
            }
            print_summary(out);
        }
        OutputFormat::Pretty => {
            println!("{}: {} pages checked", out.path, out.pages);
            for bad in &out.invalid {
                println!(
                    "  bad checksum: sid={} seq={} stored={} computed={}",
                    bad.sid, bad.sequence, bad.stored, bad.computed
                );
            }
            print_summary(out);
        }
    }
}

fn print_summary(out: &VerifyOutput) {
    for warning in &out.warnings {
        println!("  warning: {warning}");
    }
    if out.valid {
        println!("OK");
    } else {
        println!("INVALID");
    }
}
