use oggprims_page::{HEADER_SIZE, MAX_LACING_VALUES};
use oggprims_stream::DEFAULT_MAX_SYNC_SEARCH;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("oggprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: oggprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("OGGPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("OGGPRIMS_RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("format: RFC 3533 stream structure version 0");
    println!("page_header_bytes: {HEADER_SIZE}");
    println!("max_lacing_values: {MAX_LACING_VALUES}");
    println!("default_max_sync: {DEFAULT_MAX_SYNC_SEARCH}");

    Ok(SUCCESS)
}
