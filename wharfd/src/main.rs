use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use thiserror::Error;
use tracing::info;
use wharf::{IndexedStorage, Storage};
use wharfd::{
    cli::Opt,
    driver::{self, Driver, ATTACHMENTS_DIR_ENV},
    procio::ChildIo,
};

/// Flattens every fallible step of `main` into one diagnostic and exit code,
/// the way the driver binary is the only place allowed to do so.
#[derive(Debug, Error)]
enum RunError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to initialise local storage: {0}")]
    LocalStorage(#[from] wharf_fs::Error),

    #[error("failed to initialise uploader: {0}")]
    Uploader(#[from] wharf::uploader::InitError),

    #[error(transparent)]
    Driver(#[from] driver::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let opt = Opt::parse();
    init_tracing(opt.verbose);

    let result = match (&opt.local_dir, &opt.s3) {
        (Some(dir), None) => match wharf_fs::LocalStorage::new(dir).await {
            Ok(storage) => run(opt, storage).await,
            Err(e) => Err(RunError::from(e)),
        },
        (None, Some(bucket)) => {
            let storage = wharf_s3::S3Storage::from_env(bucket.clone()).await;
            run(opt, storage).await
        }
        (None, None) => {
            tracing::error!("one of --local-dir or --s3 is required");
            return ExitCode::FAILURE;
        }
        (Some(_), Some(_)) => unreachable!("clap enforces --local-dir and --s3 are exclusive"),
    };

    match result {
        Ok(code) => exit_code(code),
        Err(e) => {
            tracing::error!(error = %e, "driver aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run<S: Storage + 'static>(opt: Opt, storage: S) -> Result<i32, RunError> {
    let output_name = opt.output_name();
    let attachments_dir = tempfile::tempdir()?;

    let storage = Arc::new(IndexedStorage::new(storage));
    let uploader = wharf::ChunkedUploader::new(storage.clone(), output_name, &opt.encoding).await?;

    let program = opt.command.first().expect("clap requires a non-empty command");
    let args = &opt.command[1..];

    info!(program, ?args, "spawning child");

    let child_io = ChildIo::spawn(
        program,
        args,
        [(
            ATTACHMENTS_DIR_ENV.to_string(),
            attachments_dir.path().display().to_string(),
        )],
    )?;

    let driver = Driver::new(child_io, uploader, storage, attachments_dir.path());
    let code = driver.run().await?;

    Ok(code)
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
