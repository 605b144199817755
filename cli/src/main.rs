mod build;
mod cache;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pokedex")]
#[command(about = "Build a local pokedex dataset from a remote catalog API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and enrich every entity in the ID range, then write the dataset
    Build(build::BuildArgs),
    /// Show HTTP cache statistics
    CacheStats {
        /// Cache directory (default: ~/.pokedex/http-cache)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Delete every cached HTTP response
    ClearCache {
        /// Cache directory (default: ~/.pokedex/http-cache)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// Log to stderr so stdout only carries the output path.
/// `RUST_LOG` overrides the default level.
fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let quiet = matches!(&cli.command, Commands::Build(args) if args.quiet);
    init_tracing(quiet);

    let result = match cli.command {
        Commands::Build(args) => build::run(args).await,
        Commands::CacheStats { cache_dir } => cache::stats(cache_dir).map(|()| ExitCode::SUCCESS),
        Commands::ClearCache { cache_dir } => cache::clear(cache_dir).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}
