use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use super::features::IntersectionsResult;
use super::service::{AnalyzeRequest, HazardAnalysisService, IntersectionsRequest, RulesStatus};
use super::AnalysisResult;
use crate::error::AppError;
use crate::store::SpatialStore;

/// Router builder exposing the analysis, feature export, dataset diagnostic
/// and rule reload endpoints.
pub fn analysis_router<S>(service: Arc<HazardAnalysisService<S>>) -> Router
where
    S: SpatialStore + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/analyze", post(analyze_handler::<S>))
        .route("/api/v1/intersections", post(intersections_handler::<S>))
        .route("/api/v1/datasets", get(datasets_handler::<S>))
        .route("/api/v1/rules/reload", post(reload_handler::<S>))
        .with_state(service)
}

pub(crate) async fn analyze_handler<S>(
    State(service): State<Arc<HazardAnalysisService<S>>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, AppError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let result = tokio::task::spawn_blocking(move || service.analyze(request)).await??;
    Ok(Json(result))
}

pub(crate) async fn intersections_handler<S>(
    State(service): State<Arc<HazardAnalysisService<S>>>,
    Json(request): Json<IntersectionsRequest>,
) -> Result<Json<IntersectionsResult>, AppError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let result = tokio::task::spawn_blocking(move || service.intersections(request)).await??;
    Ok(Json(result))
}

pub(crate) async fn datasets_handler<S>(
    State(service): State<Arc<HazardAnalysisService<S>>>,
) -> Result<Json<Value>, AppError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let resolution = tokio::task::spawn_blocking(move || service.datasets()).await??;
    Ok(Json(json!({
        "ok": true,
        "datasets": resolution.datasets,
        "warnings": resolution.warnings,
    })))
}

pub(crate) async fn reload_handler<S>(
    State(service): State<Arc<HazardAnalysisService<S>>>,
) -> Result<Json<RulesStatus>, AppError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let status = tokio::task::spawn_blocking(move || service.reload_rules()).await??;
    Ok(Json(status))
}
