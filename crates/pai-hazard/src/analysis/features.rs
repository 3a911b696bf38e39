//! Export of the hazard polygons that intersect the input, for map display.

use super::datasets::DatasetDescriptor;
use super::geometry::GeometryExpr;
use super::ranking::StudyType;
use super::DatasetError;
use crate::store::{FeatureQuery, SpatialStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Rows returned per table when the request does not set a limit.
pub const DEFAULT_FEATURE_LIMIT: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub basin: String,
    pub table: String,
    #[serde(rename = "class")]
    pub classification: Option<String>,
    pub study_type: StudyType,
}

/// GeoJSON `Feature` whose geometry is in EPSG:4326.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Value,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<HazardFeature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<HazardFeature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }
}

/// Response of a feature export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionsResult {
    pub ok: bool,
    pub fc: FeatureCollection,
    pub count: usize,
    pub warnings: Vec<String>,
}

/// Loads at most `limit` intersecting polygons of one dataset. Rows without
/// a geometry are dropped.
pub fn collect_features<S>(
    store: &S,
    dataset: &DatasetDescriptor,
    input: &GeometryExpr,
    limit: u32,
) -> Result<Vec<HazardFeature>, DatasetError>
where
    S: SpatialStore + ?Sized,
{
    let rows = store.intersecting_features(&FeatureQuery {
        table: &dataset.table,
        geometry_column: &dataset.geometry_column,
        classification_column: &dataset.classification_column,
        input,
        limit: i32::try_from(limit).unwrap_or(i32::MAX),
    })?;

    let mut features = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(geojson) = row.geojson else {
            continue;
        };
        let geometry: Value = serde_json::from_str(&geojson)
            .map_err(|err| StoreError::Decode(format!("feature geometry: {err}")))?;
        let classification = row.classification.map(|value| value.trim().to_string());
        let study_type = StudyType::infer(classification.as_deref().unwrap_or_default());

        features.push(HazardFeature {
            kind: "Feature".to_string(),
            geometry,
            properties: FeatureProperties {
                basin: dataset.basin.clone(),
                table: dataset.table.to_string(),
                classification,
                study_type,
            },
        });
    }

    debug!(
        basin = %dataset.basin,
        table = %dataset.table,
        features = features.len(),
        "intersecting features exported"
    );

    Ok(features)
}
