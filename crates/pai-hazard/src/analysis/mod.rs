//! Hazard matching and ranking engine.
//!
//! One analysis resolves the configured datasets, intersects the input
//! geometry with each of them in its native CRS, ranks the competing
//! classifications and resolves the winner to its output template.
//! Per-dataset failures become warnings; only malformed input or an empty
//! configuration fail the whole request.

pub mod datasets;
pub mod features;
pub mod geometry;
pub mod identifier;
pub mod intersection;
pub mod ranking;
pub mod router;
pub mod schema;
pub mod service;
pub mod templates;

#[cfg(test)]
mod tests;

pub use datasets::{DatasetDescriptor, DatasetResolution, DatasetResolver};
pub use features::{
    collect_features, FeatureCollection, FeatureProperties, HazardFeature, IntersectionsResult,
    DEFAULT_FEATURE_LIMIT,
};
pub use geometry::{to_dataset_crs, GeometryExpr, GeometryKind, InputGeometry, SqlParam, Srid, INPUT_SRID};
pub use identifier::{Identifier, InvalidIdentifier};
pub use intersection::{evaluate, Match, OverlapMetrics};
pub use ranking::{HazardRanker, Rank, Selection, StudyType};
pub use router::analysis_router;
pub use schema::{SchemaError, SchemaIntrospector, TableSchema};
pub use service::{
    AnalysisServiceError, AnalyzeRequest, HazardAnalysisService, IntersectionsRequest, RulesStatus,
};
pub use templates::TemplateResolver;

use crate::rules::RuleConfig;
use crate::store::{SpatialStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Failures that abort a whole analysis before any dataset is queried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Input(_) => "InputError",
            AnalysisError::Configuration(_) => "ConfigurationError",
        }
    }
}

/// Failures scoped to one dataset; they exclude the dataset and become warnings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
    #[error(transparent)]
    Query(#[from] StoreError),
    #[error("store measured input dimension {reported}, expected {expected}")]
    DimensionMismatch { expected: i32, reported: i32 },
}

/// A dataset that produced at least one intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub basin: String,
    pub table: String,
}

/// The chosen match annotated with its template and normative reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub basin: String,
    pub table: String,
    pub study_type: StudyType,
    pub classification: String,
    pub rank: u32,
    pub template: Option<String>,
    pub normativa: Option<String>,
    pub metrics: OverlapMetrics,
}

/// Response of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ok: bool,
    pub project_name: String,
    pub candidates: Vec<Candidate>,
    pub selected: Option<SelectionResult>,
    pub matches: Vec<Match>,
    pub warnings: Vec<String>,
}

/// Stateless analysis engine over a spatial store.
pub struct HazardAnalyzer<S: ?Sized> {
    store: Arc<S>,
}

impl<S> HazardAnalyzer<S>
where
    S: SpatialStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn resolve_datasets(&self, rules: &RuleConfig) -> Result<DatasetResolution, AnalysisError> {
        DatasetResolver::new(&*self.store, rules).resolve()
    }

    pub fn analyze(
        &self,
        rules: &RuleConfig,
        geometry: &Value,
        project_name: &str,
        study_hint: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let input = InputGeometry::from_value(geometry)?;
        let hint = StudyType::parse_hint(study_hint)?;

        let DatasetResolution {
            datasets,
            mut warnings,
        } = self.resolve_datasets(rules)?;

        let mut candidates = Vec::new();
        let mut matches = Vec::new();

        for dataset in &datasets {
            let expr = to_dataset_crs(&input, dataset.native_crs);
            match evaluate(&*self.store, dataset, &expr) {
                Ok(found) if found.is_empty() => {}
                Ok(found) => {
                    candidates.push(Candidate {
                        basin: dataset.basin.clone(),
                        table: dataset.table.to_string(),
                    });
                    matches.extend(found);
                }
                Err(err) => {
                    warn!(
                        basin = %dataset.basin,
                        table = %dataset.table,
                        error = %err,
                        "dataset evaluation failed"
                    );
                    warnings.push(format!(
                        "dataset {}/{} skipped: {err}",
                        dataset.basin, dataset.table
                    ));
                }
            }
        }

        if candidates.is_empty() {
            warnings.push("no intersection with the configured hazard datasets".to_string());
            return Ok(AnalysisResult {
                ok: true,
                project_name: project_name.to_string(),
                candidates,
                selected: None,
                matches,
                warnings,
            });
        }

        let ranker = HazardRanker::new(rules);
        let selection = ranker.select(&matches, hint);
        warnings.extend(selection.warnings.iter().cloned());

        let selected = selection.chosen.map(|chosen| {
            let template =
                TemplateResolver::new(rules).resolve(&chosen.basin, chosen.study_type, &chosen.classification);
            if template.is_none() {
                warnings.push(format!(
                    "template not found for {}/{}/{}: update the rule document",
                    chosen.basin, chosen.study_type, chosen.classification
                ));
            }

            info!(
                basin = %chosen.basin,
                table = %chosen.table,
                classification = %chosen.classification,
                study_type = %chosen.study_type,
                rank = selection.rank.value(),
                "hazard classification selected"
            );

            SelectionResult {
                basin: chosen.basin.clone(),
                table: chosen.table.clone(),
                study_type: chosen.study_type,
                classification: chosen.classification.clone(),
                rank: selection.rank.value(),
                template: template.and_then(|entry| entry.template.clone()),
                normativa: template.and_then(|entry| entry.normativa.clone()),
                metrics: chosen.metrics,
            }
        });

        Ok(AnalysisResult {
            ok: true,
            project_name: project_name.to_string(),
            candidates,
            selected,
            matches,
            warnings,
        })
    }

    /// Intersecting hazard polygons of the resolved datasets, optionally
    /// restricted to the named tables.
    pub fn intersecting_features(
        &self,
        rules: &RuleConfig,
        geometry: &Value,
        tables: &[String],
        limit: u32,
    ) -> Result<IntersectionsResult, AnalysisError> {
        let input = InputGeometry::from_value(geometry)?;

        let DatasetResolution {
            datasets,
            mut warnings,
        } = self.resolve_datasets(rules)?;

        for requested in tables {
            if !datasets.iter().any(|dataset| dataset.table.as_str() == requested) {
                warnings.push(format!("table {requested} is not a resolved hazard dataset"));
            }
        }

        let mut features = Vec::new();
        for dataset in datasets
            .iter()
            .filter(|dataset| tables.is_empty() || tables.iter().any(|t| t == dataset.table.as_str()))
        {
            let expr = to_dataset_crs(&input, dataset.native_crs);
            match collect_features(&*self.store, dataset, &expr, limit) {
                Ok(found) => features.extend(found),
                Err(err) => {
                    warn!(
                        basin = %dataset.basin,
                        table = %dataset.table,
                        error = %err,
                        "feature export failed"
                    );
                    warnings.push(format!(
                        "dataset {}/{} skipped: {err}",
                        dataset.basin, dataset.table
                    ));
                }
            }
        }

        Ok(IntersectionsResult {
            ok: true,
            count: features.len(),
            fc: FeatureCollection::new(features),
            warnings,
        })
    }
}
