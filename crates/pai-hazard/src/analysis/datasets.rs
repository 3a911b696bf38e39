use super::geometry::Srid;
use super::identifier::Identifier;
use super::schema::{SchemaError, SchemaIntrospector};
use super::{AnalysisError, DatasetError};
use crate::rules::RuleConfig;
use crate::store::SpatialStore;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A hazard table ready to be queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDescriptor {
    pub basin: String,
    pub table: Identifier,
    pub geometry_column: Identifier,
    pub classification_column: Identifier,
    /// SRID of the first non-null geometry; 0 when the table has none.
    pub native_crs: Srid,
}

/// Descriptors plus the reasons any configured dataset was left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetResolution {
    pub datasets: Vec<DatasetDescriptor>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnOverrides<'c> {
    geometry: Option<&'c str>,
    classification: Option<&'c str>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Expands the rule document into concrete dataset descriptors.
///
/// Explicit `datasets` entries come first, in document order, followed by the
/// tables discovered for each entry of `basins`. A table is described once
/// even if several entries name it.
pub struct DatasetResolver<'a, S: ?Sized> {
    store: &'a S,
    rules: &'a RuleConfig,
    introspector: SchemaIntrospector<'a, S>,
}

impl<'a, S> DatasetResolver<'a, S>
where
    S: SpatialStore + ?Sized,
{
    pub fn new(store: &'a S, rules: &'a RuleConfig) -> Self {
        Self {
            store,
            rules,
            introspector: SchemaIntrospector::new(store, &rules.detection),
        }
    }

    pub fn resolve(&self) -> Result<DatasetResolution, AnalysisError> {
        let rules = self.rules;
        if !rules.has_datasets() {
            return Err(AnalysisError::Configuration(
                "no datasets configured in the rule document (datasets: [...] or basins: {...})"
                    .to_string(),
            ));
        }

        let mut resolution = DatasetResolution::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, hint) in rules.datasets.iter().enumerate() {
            let (Some(basin), Some(table)) = (non_blank(&hint.basin), non_blank(&hint.table))
            else {
                resolution.warnings.push(format!(
                    "dataset entry #{} skipped: both basin and table are required",
                    index + 1
                ));
                continue;
            };

            let overrides = ColumnOverrides {
                geometry: non_blank(&hint.geom_col),
                classification: non_blank(&hint.class_col),
            };
            self.push(&mut resolution, &mut seen, basin, table, overrides);
        }

        for (basin, hint) in &rules.basins {
            let prefix = hint.prefix_for(basin);
            let tables = match self.store.registered_tables_with_prefix(&prefix) {
                Ok(tables) => tables,
                Err(err) => {
                    warn!(%basin, %prefix, error = %err, "table discovery failed");
                    resolution
                        .warnings
                        .push(format!("basin {basin}: table discovery failed: {err}"));
                    continue;
                }
            };

            if tables.is_empty() {
                resolution
                    .warnings
                    .push(format!("basin {basin}: no spatial tables match prefix '{prefix}'"));
                continue;
            }

            let overrides = ColumnOverrides {
                geometry: non_blank(&hint.geom_col),
                classification: non_blank(&hint.class_col),
            };
            for table in &tables {
                self.push(&mut resolution, &mut seen, basin, table, overrides);
            }
        }

        Ok(resolution)
    }

    fn push(
        &self,
        resolution: &mut DatasetResolution,
        seen: &mut HashSet<String>,
        basin: &str,
        table: &str,
        overrides: ColumnOverrides<'_>,
    ) {
        if !seen.insert(table.to_string()) {
            debug!(%basin, %table, "table already resolved, skipping duplicate entry");
            return;
        }

        match self.describe(basin, table, overrides) {
            Ok(descriptor) => resolution.datasets.push(descriptor),
            Err(err) => {
                warn!(%basin, %table, error = %err, "dataset excluded from analysis");
                resolution
                    .warnings
                    .push(format!("dataset {basin}/{table} excluded: {err}"));
            }
        }
    }

    fn describe(
        &self,
        basin: &str,
        table: &str,
        overrides: ColumnOverrides<'_>,
    ) -> Result<DatasetDescriptor, DatasetError> {
        let table = Identifier::parse(table)?;
        if !self.store.table_exists(&table)? {
            return Err(SchemaError::TableNotFound(table.to_string()).into());
        }

        let schema = self.introspector.inspect(&table)?;
        let rules = self.introspector.rules();

        let geometry_column = match overrides.geometry {
            Some(column) => schema.require_column(column)?,
            None => schema.geometry_column(rules)?,
        };
        let classification_column = match overrides.classification {
            Some(column) => schema.require_column(column)?,
            None => schema.classification_column(rules)?,
        };

        let native_crs = self
            .store
            .sample_srid(&table, &geometry_column)?
            .unwrap_or(0);

        Ok(DatasetDescriptor {
            basin: basin.to_string(),
            table,
            geometry_column,
            classification_column,
            native_crs,
        })
    }
}
