use crate::commands::{run_analyze, run_datasets, AnalyzeArgs, DatasetsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use pai_hazard::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pai-hazard",
    about = "Match project geometries against PAI flood and landslide hazard layers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Analyse one GeoJSON geometry and print the selected hazard class
    Analyze(AnalyzeArgs),
    /// Show the datasets the rule document resolves to
    Datasets(DatasetsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Rule document to use instead of RULES_PATH
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Analyze(args) => run_analyze(args).await,
        Command::Datasets(args) => run_datasets(args).await,
    }
}
