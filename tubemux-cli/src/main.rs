mod cli;
mod config;
mod error;
mod output;
mod progress;

use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use tubemux_engine::{
    FfmpegMuxer, HttpFetcher, Locator, NoopProgressFactory, Pipeline, ProgressFactory,
    YtDlpProvider,
};

use crate::cli::Args;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::progress::IndicatifProgressFactory;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let code = match run(args).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            1
        }
    };
    process::exit(code);
}

/// Returns whether every job finished without failing.
async fn run(args: Args) -> Result<bool> {
    let started = Instant::now();

    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_args(&args);

    let locator = Locator::new(args.url.as_str());
    if locator.as_str().is_empty() {
        return Err(AppError::InvalidInput("the URL must not be empty".into()));
    }

    let dest_dir = config.download_dir();
    tokio::fs::create_dir_all(&dest_dir).await?;

    let engine = config.engine_config();
    let fetcher = HttpFetcher::new(&config.fetcher_config())?;
    let provider = Arc::new(YtDlpProvider::new(config.yt_dlp_config(), fetcher));
    let muxer = Arc::new(FfmpegMuxer::new(
        &config.ffmpeg_path,
        engine.output_container(),
    ));
    let progress: Arc<dyn ProgressFactory> = if args.quiet {
        Arc::new(NoopProgressFactory)
    } else {
        Arc::new(IndicatifProgressFactory::new())
    };

    info!(
        dest = %dest_dir.display(),
        resolution = %args.res,
        max_concurrent = engine.concurrency(),
        "Starting"
    );
    let pipeline = Pipeline::new(provider, muxer, engine).with_progress(progress);

    let cancel = pipeline.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running jobs");
            cancel.cancel();
        }
    });

    let success = if args.playlist {
        let report = pipeline
            .run_playlist(&locator, &dest_dir, args.res.clone())
            .await?;
        output::print_report(&report);
        report.is_success()
    } else {
        let outcome = pipeline
            .run_single(locator, &dest_dir, args.res.clone())
            .await;
        output::print_outcome(&outcome);
        !outcome.is_failed()
    };

    output::print_elapsed(started.elapsed());
    Ok(success)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tubemux=info,tubemux_engine=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
