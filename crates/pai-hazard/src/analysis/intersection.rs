use super::datasets::DatasetDescriptor;
use super::geometry::GeometryExpr;
use super::ranking::StudyType;
use super::DatasetError;
use crate::store::{IntersectionQuery, IntersectionRow, SpatialStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Overlap between the input geometry and one dataset feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapMetrics {
    #[serde(rename = "intersect_area_m2")]
    pub intersect_area: f64,
    #[serde(rename = "intersect_length_m")]
    pub intersect_length: f64,
    pub hit: bool,
}

impl OverlapMetrics {
    /// Keeps only the measurement meaningful for the input's dimension:
    /// area for polygons, length for lines, neither for points.
    pub fn for_dimension(dimension: i32, area: Option<f64>, length: Option<f64>) -> Self {
        let (intersect_area, intersect_length) = match dimension {
            2 => (area.unwrap_or(0.0), 0.0),
            1 => (0.0, length.unwrap_or(0.0)),
            _ => (0.0, 0.0),
        };

        Self {
            intersect_area,
            intersect_length,
            hit: true,
        }
    }
}

/// One intersecting feature with its hazard classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub basin: String,
    pub table: String,
    pub classification: String,
    pub study_type: StudyType,
    pub metrics: OverlapMetrics,
}

impl Match {
    fn from_row(
        dataset: &DatasetDescriptor,
        row: IntersectionRow,
        expected_dimension: i32,
    ) -> Result<Self, DatasetError> {
        if let Some(reported) = row.input_dimension {
            if reported != expected_dimension {
                return Err(DatasetError::DimensionMismatch {
                    expected: expected_dimension,
                    reported,
                });
            }
        }
        let metrics = OverlapMetrics::for_dimension(
            expected_dimension,
            row.intersect_area,
            row.intersect_length,
        );
        let classification = row
            .classification
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        Ok(Self {
            basin: dataset.basin.clone(),
            table: dataset.table.to_string(),
            study_type: StudyType::infer(&classification),
            classification,
            metrics,
        })
    }
}

/// Runs the intersection query for one dataset; one [`Match`] per returned row.
pub fn evaluate<S>(
    store: &S,
    dataset: &DatasetDescriptor,
    input: &GeometryExpr,
) -> Result<Vec<Match>, DatasetError>
where
    S: SpatialStore + ?Sized,
{
    let rows = store.intersect(&IntersectionQuery {
        table: &dataset.table,
        geometry_column: &dataset.geometry_column,
        classification_column: &dataset.classification_column,
        input,
    })?;

    let matches = rows
        .into_iter()
        .map(|row| Match::from_row(dataset, row, input.dimension()))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        basin = %dataset.basin,
        table = %dataset.table,
        matches = matches.len(),
        "dataset evaluated"
    );

    Ok(matches)
}
