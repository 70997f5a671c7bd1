use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use oggprims_page::ChecksumPolicy;
use oggprims_stream::{PacketReader, ReaderConfig, DEFAULT_MAX_SYNC_SEARCH};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod pages;
pub mod streams;
pub mod verify;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List page headers.
    Pages(PagesArgs),
    /// Summarize the logical streams in a file.
    Streams(StreamsArgs),
    /// Check every page checksum.
    Verify(VerifyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Pages(args) => pages::run(args, format),
        Command::Streams(args) => streams::run(args, format),
        Command::Verify(args) => verify::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Input file and reader options shared by the inspection commands.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Ogg file to read.
    pub path: PathBuf,
    /// Junk bytes tolerated before a capture pattern.
    #[arg(
        long,
        value_name = "BYTES",
        env = "OGGPRIMS_MAX_SYNC",
        default_value_t = DEFAULT_MAX_SYNC_SEARCH
    )]
    pub max_sync: usize,
    /// Treat a stored checksum of zero as valid.
    #[arg(long, env = "OGGPRIMS_ACCEPT_ZERO_CRC")]
    pub accept_zero_checksum: bool,
}

impl InputArgs {
    pub fn checksum_policy(&self) -> ChecksumPolicy {
        if self.accept_zero_checksum {
            ChecksumPolicy::AcceptZero
        } else {
            ChecksumPolicy::Strict
        }
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_sync_search: self.max_sync,
            checksum_policy: self.checksum_policy(),
            ..ReaderConfig::default()
        }
    }

    pub fn open(&self) -> CliResult<PacketReader<BufReader<File>>> {
        self.open_with(self.reader_config())
    }

    pub fn open_with(&self, config: ReaderConfig) -> CliResult<PacketReader<BufReader<File>>> {
        let file = File::open(&self.path)
            .map_err(|err| io_error(&format!("open {}", self.path.display()), err))?;
        Ok(PacketReader::with_config(BufReader::new(file), config))
    }
}

#[derive(Args, Debug)]
pub struct PagesArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Only list pages of this logical stream.
    #[arg(long)]
    pub sid: Option<u32>,
    /// Stop after this many pages.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StreamsArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
