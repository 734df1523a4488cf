use clap::Parser;
use photo_manifest::builder;
use photo_manifest::config::{Config, ForceFlags, LoggingConfig, env_flag};
use photo_manifest::pool::worker;
use std::process::ExitCode;

/// Builds the photo manifest consumed by the gallery front-end.
#[derive(Parser, Debug)]
#[command(name = "photo-manifest", version, about)]
struct Cli {
    /// Regenerate everything, ignoring all cached state.
    #[arg(long)]
    force: bool,

    /// Recompute manifest records while reusing thumbnails where possible.
    #[arg(long)]
    force_manifest: bool,

    /// Regenerate thumbnails while reusing manifest metadata where possible.
    #[arg(long)]
    force_thumbnails: bool,

    /// Number of worker processes to start.
    #[arg(long)]
    worker: Option<usize>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    config: bool,

    /// Run as a cluster worker. Set automatically for spawned workers.
    #[arg(long, hide = true)]
    cluster_worker: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to load configuration: {:#}", error);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    if cli.config {
        match serde_json::to_string_pretty(&config) {
            Ok(text) => {
                println!("{}", text);
                return ExitCode::SUCCESS;
            }
            Err(error) => {
                eprintln!("Failed to render configuration: {}", error);
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.cluster_worker || env_flag("CLUSTER_WORKER") {
        return match worker::run(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                log::error!("Worker failed: {:#}", error);
                ExitCode::FAILURE
            }
        };
    }

    let flags = ForceFlags {
        all: cli.force,
        manifest: cli.force_manifest,
        thumbnails: cli.force_thumbnails,
    };

    match builder::run_build(&config, flags, cli.worker).await {
        Ok(summary) => {
            log::info!("Manifest written to {}", summary.manifest_path.display());
            ExitCode::SUCCESS
        }
        Err(error) => {
            log::error!("Build failed: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let mut builder = env_logger::Builder::from_default_env();
    let level = if logging.verbose {
        log::LevelFilter::Debug
    } else {
        logging.level.to_filter()
    };
    builder.filter_level(level);

    if logging.output_to_file {
        if let Some(path) = &logging.log_file_path {
            match std::fs::File::create(path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(error) => {
                    eprintln!("Could not open log file {}: {}", path.display(), error);
                }
            }
        }
    }

    let _ = builder.try_init();
}
