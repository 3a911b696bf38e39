use crate::infra::{build_service, load_config};
use crate::report::{render_analysis, render_datasets, render_matches_csv};
use clap::{Args, ValueEnum};
use pai_hazard::analysis::AnalyzeRequest;
use pai_hazard::error::AppError;
use pai_hazard::telemetry;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Args, Debug)]
pub(crate) struct AnalyzeArgs {
    /// GeoJSON file: a bare geometry, a Feature, a FeatureCollection or a request body
    #[arg(long)]
    pub(crate) geometry: PathBuf,
    /// Project name echoed in the report
    #[arg(long)]
    pub(crate) project: Option<String>,
    /// Restrict the selection to one discipline (auto, idraulico, idrogeologico)
    #[arg(long)]
    pub(crate) study_hint: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub(crate) format: ReportFormat,
    /// Rule document to use instead of RULES_PATH
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DatasetsArgs {
    /// Rule document to use instead of RULES_PATH
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Print the resolution as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let AnalyzeArgs {
        geometry,
        project,
        study_hint,
        format,
        rules,
    } = args;

    let config = load_config(rules)?;
    telemetry::init(&config.telemetry)?;

    let mut request = read_request(&geometry)?;
    if let Some(project) = project {
        request.project_name = Some(project);
    }
    if let Some(hint) = study_hint {
        request.study_hint = Some(hint);
    }

    let service = build_service(&config).await?;
    let result = tokio::task::spawn_blocking(move || service.analyze(request)).await??;

    match format {
        ReportFormat::Text => print!("{}", render_analysis(&result)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        ReportFormat::Csv => print!("{}", render_matches_csv(&result.matches)?),
    }
    Ok(())
}

pub(crate) async fn run_datasets(args: DatasetsArgs) -> Result<(), AppError> {
    let config = load_config(args.rules)?;
    telemetry::init(&config.telemetry)?;

    let service = build_service(&config).await?;
    let resolution = tokio::task::spawn_blocking(move || service.datasets()).await??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print!("{}", render_datasets(&resolution));
    }
    Ok(())
}

pub(crate) fn read_request(path: &Path) -> Result<AnalyzeRequest, AppError> {
    let text = std::fs::read_to_string(path)?;
    request_from_json(serde_json::from_str(&text)?)
}

/// A document carrying `coordinates` is the geometry itself; anything else is
/// read as a request body (which also covers Feature and FeatureCollection).
pub(crate) fn request_from_json(value: Value) -> Result<AnalyzeRequest, AppError> {
    if value.get("coordinates").is_some() {
        return Ok(AnalyzeRequest::new(value));
    }
    Ok(serde_json::from_value(value)?)
}
