use clap::{error::ErrorKind, Arg, ArgAction, Command};
use log::LevelFilter;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::assemble_cmd;
use crate::chunk_cmd;
use crate::list_cmd;
use crate::string_utils::parse_size;
use crate::verify_cmd;
use crate::PKG_NAME;
use crate::PKG_VERSION;
use caibr::{Compression, IndexFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOpts {
    pub filter: LevelFilter,
}

impl LogOpts {
    fn new(filter: LevelFilter) -> Self {
        Self { filter }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOpts {
    Chunk(chunk_cmd::Options),
    Assemble(assemble_cmd::Options),
    Verify(verify_cmd::Options),
    List(list_cmd::Options),
}

fn add_chunker_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("min-chunk-size")
            .long("min")
            .value_name("SIZE")
            .help("Minimal size of chunks [default: 16KiB]"),
    )
    .arg(
        Arg::new("avg-chunk-size")
            .long("avg")
            .value_name("SIZE")
            .help("Target average size of chunks [default: 64KiB]"),
    )
    .arg(
        Arg::new("max-chunk-size")
            .long("max")
            .value_name("SIZE")
            .help("Maximal size of chunks [default: 256KiB]"),
    )
}

pub fn parse_opts<I, T>(args: I) -> Result<(CommandOpts, LogOpts), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let chunk_subcmd = add_chunker_args(
        Command::new("chunk")
            .about("Split a file into chunks and write an index.")
            .arg(
                Arg::new("INPUT")
                    .value_name("INPUT")
                    .help("Input file")
                    .required(true),
            )
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_name("FILE")
                    .help("Index output file [default: INPUT plus index extension]"),
            )
            .arg(
                Arg::new("compression")
                    .long("compression")
                    .value_name("TYPE")
                    .help("Chunk data compression type (zstd, none) [default: zstd]"),
            )
            .arg(
                Arg::new("compression-level")
                    .long("compression-level")
                    .value_name("LEVEL")
                    .help("Chunk data compression level [default: 1]"),
            )
            .arg(
                Arg::new("store")
                    .long("store")
                    .value_name("DIR")
                    .help("Write chunks to a local store instead of embedding them in the index"),
            )
            .arg(
                Arg::new("archive-index")
                    .long("archive-index")
                    .action(ArgAction::SetTrue)
                    .help("Write a caidx index (input is an archive stream) instead of caibx"),
            )
            .arg(
                Arg::new("force-create")
                    .short('f')
                    .long("force-create")
                    .action(ArgAction::SetTrue)
                    .help("Overwrite output files if they exist"),
            ),
    );
    let assemble_subcmd = add_chunker_args(
        Command::new("assemble")
            .about("Rebuild the original stream described by an index.")
            .arg(
                Arg::new("INDEX")
                    .value_name("INDEX")
                    .help("Index file")
                    .required(true),
            )
            .arg(
                Arg::new("OUTPUT")
                    .value_name("OUTPUT")
                    .help("Output file")
                    .required(true),
            )
            .arg(
                Arg::new("store")
                    .long("store")
                    .value_name("DIR")
                    .help("Local chunk store to fetch chunks from"),
            )
            .arg(
                Arg::new("seed")
                    .long("seed")
                    .value_name("FILE")
                    .action(ArgAction::Append)
                    .help(
                        "File to scan for chunks before going to the store. Scanned with the \
                         chunker configuration given by --min/--avg/--max, which must match \
                         the one used while chunking",
                    ),
            )
            .arg(
                Arg::new("no-verify")
                    .long("no-verify")
                    .action(ArgAction::SetTrue)
                    .help("Skip verifying the id of each chunk while assembling"),
            )
            .arg(
                Arg::new("force")
                    .long("force")
                    .action(ArgAction::SetTrue)
                    .help("Assemble even if the index checksum does not match"),
            )
            .arg(
                Arg::new("force-create")
                    .short('f')
                    .long("force-create")
                    .action(ArgAction::SetTrue)
                    .help("Overwrite output files if they exist"),
            ),
    );
    let verify_subcmd = Command::new("verify")
        .about("Validate an index and, optionally, the chunks it refers to.")
        .arg(
            Arg::new("INDEX")
                .value_name("INDEX")
                .help("Index file")
                .required(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("DIR")
                .help("Local chunk store to verify chunks against"),
        );
    let list_subcmd = Command::new("list")
        .about("Print index details and its chunk table.")
        .arg(
            Arg::new("INDEX")
                .value_name("INDEX")
                .help("Index file")
                .required(true),
        );
    let mut cmd = Command::new(PKG_NAME)
        .version(PKG_VERSION)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Set verbosity level"),
        )
        .arg(
            Arg::new("buffered-chunks")
                .long("buffered-chunks")
                .value_name("COUNT")
                .global(true)
                .help("Limit number of chunks processed simultaneously [default: cores available x 2]"),
        )
        .subcommand(chunk_subcmd)
        .subcommand(assemble_subcmd)
        .subcommand(verify_subcmd)
        .subcommand(list_subcmd);
    let matches = cmd.try_get_matches_from_mut(args)?;

    let log_opts = LogOpts::new(match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    let num_chunk_buffers = match matches.get_one::<String>("buffered-chunks") {
        Some(value) => match value.parse() {
            Ok(count) => count,
            Err(_) => return Err(cmd.error(ErrorKind::ValueValidation, "invalid buffer count")),
        },
        None => match num_cpus::get() {
            0 | 1 => 1,
            n => n * 2,
        },
    };

    if let Some(matches) = matches.subcommand_matches("chunk") {
        let (min_chunk_size, avg_chunk_size, max_chunk_size) = chunker_sizes(&mut cmd, matches)?;
        let compression_level = match matches.get_one::<String>("compression-level") {
            Some(value) => match value.parse() {
                Ok(level) => level,
                Err(_) => {
                    return Err(cmd.error(ErrorKind::ValueValidation, "invalid compression level"))
                }
            },
            None => Compression::DEFAULT_ZSTD_LEVEL,
        };
        let compression = match matches
            .get_one::<String>("compression")
            .map(String::as_str)
            .unwrap_or("zstd")
        {
            "zstd" => Compression::Zstd(compression_level),
            "none" => Compression::None,
            other => {
                return Err(cmd.error(
                    ErrorKind::ValueValidation,
                    format!("invalid compression '{}'", other),
                ))
            }
        };
        Ok((
            CommandOpts::Chunk(chunk_cmd::Options {
                input: require_path(matches, "INPUT"),
                output: matches.get_one::<String>("output").map(PathBuf::from),
                min_chunk_size,
                avg_chunk_size,
                max_chunk_size,
                compression,
                store: matches.get_one::<String>("store").map(PathBuf::from),
                format: if matches.get_flag("archive-index") {
                    IndexFormat::Caidx
                } else {
                    IndexFormat::Caibx
                },
                force_create: matches.get_flag("force-create"),
                num_chunk_buffers,
            }),
            log_opts,
        ))
    } else if let Some(matches) = matches.subcommand_matches("assemble") {
        let (min_chunk_size, avg_chunk_size, max_chunk_size) = chunker_sizes(&mut cmd, matches)?;
        let seeds = matches
            .get_many::<String>("seed")
            .unwrap_or_default()
            .map(PathBuf::from)
            .collect();
        Ok((
            CommandOpts::Assemble(assemble_cmd::Options {
                index: require_path(matches, "INDEX"),
                output: require_path(matches, "OUTPUT"),
                store: matches.get_one::<String>("store").map(PathBuf::from),
                seeds,
                min_chunk_size,
                avg_chunk_size,
                max_chunk_size,
                verify: !matches.get_flag("no-verify"),
                force: matches.get_flag("force"),
                force_create: matches.get_flag("force-create"),
                num_chunk_buffers,
            }),
            log_opts,
        ))
    } else if let Some(matches) = matches.subcommand_matches("verify") {
        Ok((
            CommandOpts::Verify(verify_cmd::Options {
                index: require_path(matches, "INDEX"),
                store: matches.get_one::<String>("store").map(PathBuf::from),
            }),
            log_opts,
        ))
    } else if let Some(matches) = matches.subcommand_matches("list") {
        Ok((
            CommandOpts::List(list_cmd::Options {
                index: require_path(matches, "INDEX"),
            }),
            log_opts,
        ))
    } else {
        Err(cmd.error(ErrorKind::MissingSubcommand, "missing command"))
    }
}

fn chunker_sizes(
    cmd: &mut Command,
    matches: &clap::ArgMatches,
) -> Result<(usize, usize, usize), clap::Error> {
    let min = size_arg(cmd, matches, "min-chunk-size", 16 * 1024)?;
    let avg = size_arg(cmd, matches, "avg-chunk-size", 64 * 1024)?;
    let max = size_arg(cmd, matches, "max-chunk-size", 256 * 1024)?;
    Ok((min, avg, max))
}

fn size_arg(
    cmd: &mut Command,
    matches: &clap::ArgMatches,
    name: &str,
    default: usize,
) -> Result<usize, clap::Error> {
    match matches.get_one::<String>(name) {
        Some(value) => parse_size(value).map_err(|err| cmd.error(ErrorKind::ValueValidation, err)),
        None => Ok(default),
    }
}

fn require_path(matches: &clap::ArgMatches, name: &str) -> PathBuf {
    // Argument is marked required so parsing has already ensured it.
    matches
        .get_one::<String>(name)
        .map(|value| Path::new(value).to_path_buf())
        .unwrap_or_default()
}
