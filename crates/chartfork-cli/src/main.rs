//! chartfork CLI - maintain forks of upstream Helm charts as change-sets

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "chartfork")]
#[command(version)]
#[command(about = "Maintain forks of upstream Helm charts as reviewable change-sets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root of the chart repository
    #[arg(long, global = true, default_value = ".")]
    repo_root: PathBuf,

    /// Only operate on this package
    #[arg(short, long, global = true, env = "CHARTFORK_PACKAGE")]
    package: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull charts into their working directories and apply their change-sets
    Prepare,

    /// Record the edits made to prepared charts as change-sets
    Patch,

    /// Prepare packages and release their charts into assets/ and charts/
    Charts {
        /// Replace charts that were already generated
        #[arg(long)]
        overwrite: bool,
    },

    /// Delete the working directories of packages
    Clean,

    /// Regenerate every chart and compare with the released snapshot
    Validate {
        /// Snapshot directory to compare with (default: configured branch, else the repository)
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Copy the regenerated charts into the repository when nothing drifted
        #[arg(long)]
        keep: bool,

        /// Compare release candidates as they are instead of folding them
        #[arg(long)]
        keep_release_candidates: bool,
    },

    /// List packages
    List,

    /// Mark a chart version as pending release
    Release {
        /// Chart name
        chart: String,

        /// Chart version
        #[arg(id = "chart_version", value_name = "VERSION")]
        version: String,
    },

    /// Remove cached upstream checkouts
    ClearCache,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(layer).with(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let root = cli.repo_root.as_path();
    let package = cli.package.as_deref();

    let result = match cli.command {
        Commands::Prepare => commands::prepare::run(root, package).await,
        Commands::Patch => commands::patch::run(root, package).await,
        Commands::Charts { overwrite } => commands::charts::run(root, package, overwrite).await,
        Commands::Clean => commands::clean::run(root, package),
        Commands::Validate {
            reference,
            keep,
            keep_release_candidates,
        } => {
            commands::validate::run(root, package, reference, keep, !keep_release_candidates).await
        }
        Commands::List => commands::list::run(root, package),
        Commands::Release { chart, version } => commands::release::run(root, &chart, &version),
        Commands::ClearCache => commands::cache::clear(root),
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code as u8)
        }
    }
}
