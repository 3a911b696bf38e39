//! Schema-on-read discovery of the geometry and classification columns.
//!
//! Detection runs an ordered list of probes; the first probe that yields a
//! column wins. The probe order and the name lists it consults are part of
//! the observable contract.

use super::identifier::Identifier;
use super::DatasetError;
use crate::rules::DetectionRules;
use crate::store::{ColumnInfo, SpatialStore};

/// Probes used to locate the geometry column, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryProbe {
    /// Column declared for the table in the spatial registry.
    SpatialRegistry,
    /// First column whose storage type is `geometry`.
    GeometryType,
    /// First conventional name (`geom`, `wkb_geometry`, ...) present, case-insensitively.
    ConventionalName,
}

pub const GEOMETRY_PROBES: [GeometryProbe; 3] = [
    GeometryProbe::SpatialRegistry,
    GeometryProbe::GeometryType,
    GeometryProbe::ConventionalName,
];

/// Probes used to locate the hazard classification column, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationProbe {
    /// Exact preferred name, case-insensitively, in list order.
    PreferredName,
    /// Column name containing a risk-related fragment, fragments in list order.
    RiskFragment,
}

pub const CLASSIFICATION_PROBES: [ClassificationProbe; 2] = [
    ClassificationProbe::PreferredName,
    ClassificationProbe::RiskFragment,
];

/// Column-level failures that exclude a single dataset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("cannot detect a geometry column for table '{0}'")]
    NoGeometryColumn(String),
    #[error(
        "cannot detect a classification column for table '{0}'; set class_col in the rules"
    )]
    NoClassificationColumn(String),
    #[error("configured column '{column}' does not exist in table '{table}'")]
    MissingColumn { table: String, column: String },
}

/// Catalog facts about one table, fetched once and probed many times.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: Identifier,
    registered_geometry: Option<String>,
    columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(
        table: Identifier,
        registered_geometry: Option<String>,
        columns: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            table,
            registered_geometry,
            columns,
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn by_name(&self, wanted: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(wanted) || column.name == wanted)
    }

    fn probe_geometry(&self, probe: GeometryProbe, rules: &DetectionRules) -> Option<String> {
        match probe {
            GeometryProbe::SpatialRegistry => self
                .registered_geometry
                .clone()
                .filter(|name| !name.is_empty()),
            GeometryProbe::GeometryType => self
                .columns
                .iter()
                .find(|column| column.udt_name.eq_ignore_ascii_case("geometry"))
                .map(|column| column.name.clone()),
            GeometryProbe::ConventionalName => rules
                .geometry_names
                .iter()
                .find_map(|name| self.by_name(name))
                .map(|column| column.name.clone()),
        }
    }

    fn probe_classification(
        &self,
        probe: ClassificationProbe,
        rules: &DetectionRules,
    ) -> Option<String> {
        match probe {
            ClassificationProbe::PreferredName => rules
                .classification_names
                .iter()
                .find_map(|name| self.by_name(name))
                .map(|column| column.name.clone()),
            ClassificationProbe::RiskFragment => {
                rules.classification_fragments.iter().find_map(|fragment| {
                    let fragment = fragment.to_lowercase();
                    self.columns
                        .iter()
                        .find(|column| column.name.to_lowercase().contains(&fragment))
                        .map(|column| column.name.clone())
                })
            }
        }
    }

    pub fn geometry_column(&self, rules: &DetectionRules) -> Result<Identifier, DatasetError> {
        let found = GEOMETRY_PROBES
            .iter()
            .find_map(|probe| self.probe_geometry(*probe, rules))
            .ok_or_else(|| SchemaError::NoGeometryColumn(self.table.to_string()))?;
        Ok(Identifier::parse(&found)?)
    }

    pub fn classification_column(
        &self,
        rules: &DetectionRules,
    ) -> Result<Identifier, DatasetError> {
        let found = CLASSIFICATION_PROBES
            .iter()
            .find_map(|probe| self.probe_classification(*probe, rules))
            .ok_or_else(|| SchemaError::NoClassificationColumn(self.table.to_string()))?;
        Ok(Identifier::parse(&found)?)
    }

    /// Resolves a configured column name against the catalog spelling.
    pub fn require_column(&self, configured: &str) -> Result<Identifier, DatasetError> {
        Identifier::parse(configured.trim())?;
        let column = self
            .by_name(configured.trim())
            .ok_or_else(|| SchemaError::MissingColumn {
                table: self.table.to_string(),
                column: configured.trim().to_string(),
            })?;
        Ok(Identifier::parse(&column.name)?)
    }
}

/// Reads table metadata from the spatial store and applies the detection probes.
pub struct SchemaIntrospector<'a, S: ?Sized> {
    store: &'a S,
    rules: &'a DetectionRules,
}

impl<'a, S> SchemaIntrospector<'a, S>
where
    S: SpatialStore + ?Sized,
{
    pub fn new(store: &'a S, rules: &'a DetectionRules) -> Self {
        Self { store, rules }
    }

    pub fn rules(&self) -> &DetectionRules {
        self.rules
    }

    pub fn inspect(&self, table: &Identifier) -> Result<TableSchema, DatasetError> {
        let registered_geometry = self.store.registered_geometry_column(table)?;
        let columns = self.store.columns(table)?;
        Ok(TableSchema::new(table.clone(), registered_geometry, columns))
    }

    pub fn detect_geometry_column(&self, table: &Identifier) -> Result<Identifier, DatasetError> {
        self.inspect(table)?.geometry_column(self.rules)
    }

    pub fn detect_classification_column(
        &self,
        table: &Identifier,
    ) -> Result<Identifier, DatasetError> {
        self.inspect(table)?.classification_column(self.rules)
    }
}
