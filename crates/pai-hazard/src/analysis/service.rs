use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::datasets::DatasetResolution;
use super::features::{IntersectionsResult, DEFAULT_FEATURE_LIMIT};
use super::{AnalysisError, AnalysisResult, HazardAnalyzer};
use crate::rules::{RuleConfigError, RuleStore};
use crate::store::SpatialStore;

/// Body of an analysis request.
///
/// Besides `{geometry, project_name, study_hint}` the body may be a GeoJSON
/// `Feature` (its `geometry` member is picked up directly) or a
/// `FeatureCollection`, in which case the first feature's geometry is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default, alias = "project")]
    pub project_name: Option<String>,
    #[serde(default)]
    pub study_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Value>,
}

impl AnalyzeRequest {
    pub fn new(geometry: Value) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = Some(project_name.into());
        self
    }

    pub fn with_study_hint(mut self, study_hint: impl Into<String>) -> Self {
        self.study_hint = Some(study_hint.into());
        self
    }

    /// The geometry to analyse, falling back to the first feature's geometry.
    pub fn input_geometry(&self) -> Option<&Value> {
        first_geometry(self.geometry.as_ref(), &self.features)
    }
}

fn first_geometry<'a>(geometry: Option<&'a Value>, features: &'a [Value]) -> Option<&'a Value> {
    geometry.filter(|value| !value.is_null()).or_else(|| {
        features
            .first()
            .and_then(|feature| feature.get("geometry"))
            .filter(|value| !value.is_null())
    })
}

/// Body of a feature export request. Geometry handling matches
/// [`AnalyzeRequest`]; `tables` restricts the export to those datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionsRequest {
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Value>,
}

impl IntersectionsRequest {
    pub fn new(geometry: Value) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }

    pub fn input_geometry(&self) -> Option<&Value> {
        first_geometry(self.geometry.as_ref(), &self.features)
    }
}

/// Summary of the rule snapshot currently in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesStatus {
    pub ok: bool,
    pub loaded_at: DateTime<Utc>,
    pub datasets: usize,
    pub basins: usize,
}

/// Entry point shared by the HTTP router and the CLI: pairs the analyzer with
/// the rule document cache.
pub struct HazardAnalysisService<S: ?Sized> {
    analyzer: HazardAnalyzer<S>,
    rules: Arc<RuleStore>,
}

impl<S> HazardAnalysisService<S>
where
    S: SpatialStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, rules: Arc<RuleStore>) -> Self {
        Self {
            analyzer: HazardAnalyzer::new(store),
            rules,
        }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AnalysisServiceError> {
        let geometry = request
            .input_geometry()
            .ok_or_else(|| AnalysisError::Input("missing geometry".to_string()))?;
        let snapshot = self.rules.snapshot()?;

        let result = self.analyzer.analyze(
            &snapshot.rules,
            geometry,
            request.project_name.as_deref().unwrap_or_default(),
            request.study_hint.as_deref().unwrap_or_default(),
        )?;
        Ok(result)
    }

    pub fn intersections(
        &self,
        request: IntersectionsRequest,
    ) -> Result<IntersectionsResult, AnalysisServiceError> {
        let geometry = request
            .input_geometry()
            .ok_or_else(|| AnalysisError::Input("missing geometry".to_string()))?;
        let snapshot = self.rules.snapshot()?;

        let result = self.analyzer.intersecting_features(
            &snapshot.rules,
            geometry,
            &request.tables,
            request.limit.unwrap_or(DEFAULT_FEATURE_LIMIT),
        )?;
        Ok(result)
    }

    pub fn datasets(&self) -> Result<DatasetResolution, AnalysisServiceError> {
        let snapshot = self.rules.snapshot()?;
        Ok(self.analyzer.resolve_datasets(&snapshot.rules)?)
    }

    pub fn reload_rules(&self) -> Result<RulesStatus, AnalysisServiceError> {
        let snapshot = self.rules.reload()?;
        Ok(RulesStatus {
            ok: true,
            loaded_at: snapshot.loaded_at,
            datasets: snapshot.rules.datasets.len(),
            basins: snapshot.rules.basins.len(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisServiceError {
    #[error(transparent)]
    Rules(#[from] RuleConfigError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl AnalysisServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisServiceError::Rules(_) => "RuleConfigError",
            AnalysisServiceError::Analysis(error) => error.kind(),
        }
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, AnalysisServiceError::Analysis(AnalysisError::Input(_)))
    }
}
