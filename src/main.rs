mod assemble_cmd;
mod chunk_cmd;
mod cli;
mod list_cmd;
mod string_utils;
mod verify_cmd;

use anyhow::Result;
use log::*;
use std::process::ExitCode;

use caibr::{
    api::{chunk::ChunkError, verify::VerifyError},
    assemble::AssembleError,
    cacnk::FrameError,
    chunker::ConfigError,
    store::StoreError,
    CancelFlag, CompressionError, IndexError,
};

pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const EXIT_CONFIG: u8 = 2;
const EXIT_IO: u8 = 3;
const EXIT_INTEGRITY: u8 = 4;
const EXIT_NOT_FOUND: u8 = 5;
const EXIT_CANCELLED: u8 = 130;

fn init_log(level: log::LevelFilter) -> Result<()> {
    let local_level = level;
    fern::Dispatch::new()
        .format(move |out, message, record| {
            if local_level > log::LevelFilter::Info {
                // Add some extra info to each message in debug
                out.finish(format_args!(
                    "[{}]({})({}) {}",
                    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                    record.target(),
                    record.level(),
                    message
                ))
            } else {
                out.finish(format_args!("{}", message))
            }
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

// Map an error chain onto the documented exit codes.
fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if cause.is::<ConfigError>() {
            return EXIT_CONFIG;
        }
        if let Some(err) = cause.downcast_ref::<ChunkError>() {
            return match err {
                ChunkError::Cancelled => EXIT_CANCELLED,
                ChunkError::Store(StoreError::NotFound(_)) => EXIT_NOT_FOUND,
                ChunkError::Compression(CompressionError::Decompression(_)) => EXIT_INTEGRITY,
                ChunkError::IO(_)
                | ChunkError::Compression(_)
                | ChunkError::Store(_)
                | ChunkError::TaskJoin(_) => EXIT_IO,
            };
        }
        if let Some(err) = cause.downcast_ref::<AssembleError>() {
            return match err {
                AssembleError::Cancelled => EXIT_CANCELLED,
                AssembleError::Store(StoreError::NotFound(_)) => EXIT_NOT_FOUND,
                AssembleError::Store(_) => EXIT_IO,
                AssembleError::Index(IndexError::IO(_)) => EXIT_IO,
                AssembleError::Index(_) => EXIT_INTEGRITY,
                AssembleError::Frame(_) => EXIT_INTEGRITY,
                AssembleError::Compression(CompressionError::IO(_)) => EXIT_IO,
                AssembleError::Compression(_) => EXIT_INTEGRITY,
                AssembleError::ChunkIdMismatch { .. } => EXIT_INTEGRITY,
                AssembleError::IO(_) | AssembleError::TaskJoin(_) => EXIT_IO,
            };
        }
        if let Some(err) = cause.downcast_ref::<VerifyError>() {
            return match err {
                VerifyError::Cancelled => EXIT_CANCELLED,
                VerifyError::Store(StoreError::NotFound(_)) => EXIT_NOT_FOUND,
                VerifyError::Store(_) => EXIT_IO,
                VerifyError::Index(IndexError::IO(_)) => EXIT_IO,
                VerifyError::Index(_) => EXIT_INTEGRITY,
                VerifyError::Frame(_) => EXIT_INTEGRITY,
                VerifyError::ChunkIdMismatch { .. } => EXIT_INTEGRITY,
            };
        }
        if let Some(err) = cause.downcast_ref::<IndexError>() {
            return match err {
                IndexError::IO(_) => EXIT_IO,
                _ => EXIT_INTEGRITY,
            };
        }
        if let Some(err) = cause.downcast_ref::<StoreError>() {
            return match err {
                StoreError::NotFound(_) => EXIT_NOT_FOUND,
                _ => EXIT_IO,
            };
        }
        if let Some(err) = cause.downcast_ref::<FrameError>() {
            return match err {
                FrameError::Compression(CompressionError::IO(_)) => EXIT_IO,
                _ => EXIT_INTEGRITY,
            };
        }
        if cause.is::<std::io::Error>() {
            return EXIT_IO;
        }
    }
    EXIT_IO
}

#[tokio::main]
async fn main() -> ExitCode {
    let (command, log_opts) = match cli::parse_opts(std::env::args_os()) {
        Ok(opts) => opts,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };
    if let Err(err) = init_log(log_opts.filter) {
        eprintln!("unable to initialize log: {}", err);
        return ExitCode::from(EXIT_IO);
    }

    // Ctrl-C requests cooperative cancellation; operations stop between
    // chunks and the process exits 130.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let result = match command {
        cli::CommandOpts::Chunk(opts) => chunk_cmd::run(opts, cancel).await,
        cli::CommandOpts::Assemble(opts) => assemble_cmd::run(opts, cancel).await,
        cli::CommandOpts::Verify(opts) => verify_cmd::run(opts, cancel).await,
        cli::CommandOpts::List(opts) => list_cmd::run(opts).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
