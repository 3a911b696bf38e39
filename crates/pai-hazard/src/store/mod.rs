//! Boundary to the spatial database that owns the hazard layers.

mod postgis;

pub use postgis::PostgisStore;

use crate::analysis::{GeometryExpr, Identifier, Srid};

/// Name and storage type of one table column, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub udt_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, udt_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            udt_name: udt_name.into(),
        }
    }
}

/// Inputs of one per-dataset intersection query.
#[derive(Debug, Clone, Copy)]
pub struct IntersectionQuery<'a> {
    pub table: &'a Identifier,
    pub geometry_column: &'a Identifier,
    pub classification_column: &'a Identifier,
    pub input: &'a GeometryExpr,
}

/// One dataset row intersecting the input geometry.
///
/// `intersect_area` is only measured for areal input and `intersect_length`
/// only for linear input; the store reports zero otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionRow {
    pub classification: Option<String>,
    pub input_dimension: Option<i32>,
    pub intersect_area: Option<f64>,
    pub intersect_length: Option<f64>,
}

/// Inputs of one per-dataset feature export query.
#[derive(Debug, Clone, Copy)]
pub struct FeatureQuery<'a> {
    pub table: &'a Identifier,
    pub geometry_column: &'a Identifier,
    pub classification_column: &'a Identifier,
    pub input: &'a GeometryExpr,
    /// Maximum number of rows returned for the table.
    pub limit: i32,
}

/// One intersecting hazard polygon, already reprojected to EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub geojson: Option<String>,
    pub classification: Option<String>,
}

/// Read-only spatial primitives used by the analysis engine.
pub trait SpatialStore: Send + Sync {
    /// Geometry column declared in the spatial registry, if the table is registered.
    fn registered_geometry_column(&self, table: &Identifier)
        -> Result<Option<String>, StoreError>;

    fn columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError>;

    fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError>;

    /// Registered spatial tables whose name starts with `prefix`, sorted by name.
    fn registered_tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// SRID of the first non-null geometry of the table.
    fn sample_srid(
        &self,
        table: &Identifier,
        geometry_column: &Identifier,
    ) -> Result<Option<Srid>, StoreError>;

    fn intersect(&self, query: &IntersectionQuery<'_>) -> Result<Vec<IntersectionRow>, StoreError>;

    fn intersecting_features(&self, query: &FeatureQuery<'_>) -> Result<Vec<FeatureRow>, StoreError>;
}

/// Failure reported by the spatial store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("spatial store connection failed: {0}")]
    Connection(String),
    #[error("spatial query failed: {0}")]
    Query(String),
    #[error("unexpected value in spatial query result: {0}")]
    Decode(String),
}
