use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::{json, Value};

use crate::analysis::{HazardAnalysisService, Identifier, Srid};
use crate::rules::{RuleConfig, RuleStore};
use crate::store::{
    ColumnInfo, FeatureQuery, FeatureRow, IntersectionQuery, IntersectionRow, SpatialStore,
    StoreError,
};

/// One feature of an in-memory hazard layer that intersects every input.
#[derive(Debug, Clone)]
pub(super) struct MemoryFeature {
    pub classification: Option<String>,
    pub area: f64,
    pub length: f64,
    /// Zone outline as exported in EPSG:4326.
    pub geojson: Option<String>,
}

pub(super) fn feature(classification: &str, area: f64) -> MemoryFeature {
    MemoryFeature {
        classification: Some(classification.to_string()),
        area,
        length: area / 10.0,
        geojson: Some(
            r#"{"type":"Polygon","coordinates":[[[14.6,41.9],[14.63,41.9],[14.63,41.93],[14.6,41.9]]]}"#
                .to_string(),
        ),
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct MemoryTable {
    pub registered_geometry: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub srid: Option<Srid>,
    pub features: Vec<MemoryFeature>,
    pub failure: Option<StoreError>,
}

impl MemoryTable {
    /// Registered table with `geom` and `pericolosita` columns in UTM 33N.
    pub(super) fn hazard_layer(features: Vec<MemoryFeature>) -> Self {
        Self {
            registered_geometry: Some("geom".to_string()),
            columns: vec![
                ColumnInfo::new("gid", "int4"),
                ColumnInfo::new("pericolosita", "varchar"),
                ColumnInfo::new("geom", "geometry"),
            ],
            srid: Some(32633),
            features,
            failure: None,
        }
    }

    pub(super) fn with_columns(mut self, columns: &[(&str, &str)]) -> Self {
        self.columns = columns
            .iter()
            .map(|(name, udt)| ColumnInfo::new(*name, *udt))
            .collect();
        self
    }

    pub(super) fn with_srid(mut self, srid: Option<Srid>) -> Self {
        self.srid = srid;
        self
    }

    pub(super) fn unregistered(mut self) -> Self {
        self.registered_geometry = None;
        self
    }

    pub(super) fn failing(mut self, failure: StoreError) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Intersection query as seen by the store.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct RecordedQuery {
    pub table: String,
    pub geometry_column: String,
    pub classification_column: String,
    pub srid: Srid,
    pub reprojected: bool,
    /// Row limit of a feature export; `None` for intersection queries.
    pub limit: Option<i32>,
}

/// In-memory spatial store that records every call it receives.
#[derive(Debug, Default)]
pub(super) struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
    discovery_failure: Option<StoreError>,
    calls: Mutex<Vec<String>>,
    queries: Mutex<Vec<RecordedQuery>>,
}

impl MemoryStore {
    pub(super) fn with_table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    pub(super) fn with_discovery_failure(mut self, failure: StoreError) -> Self {
        self.discovery_failure = Some(failure);
        self
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(super) fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().expect("queries lock").clone()
    }

    fn record(&self, call: &str, subject: &str) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{call}:{subject}"));
    }

    fn table(&self, table: &Identifier) -> Option<&MemoryTable> {
        self.tables.get(table.as_str())
    }

    fn queried_table(&self, table: &Identifier) -> Result<&MemoryTable, StoreError> {
        let entry = self
            .table(table)
            .ok_or_else(|| StoreError::Query(format!("relation {table} does not exist")))?;
        match &entry.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(entry),
        }
    }
}

impl SpatialStore for MemoryStore {
    fn registered_geometry_column(
        &self,
        table: &Identifier,
    ) -> Result<Option<String>, StoreError> {
        self.record("registered_geometry_column", table.as_str());
        Ok(self
            .table(table)
            .and_then(|entry| entry.registered_geometry.clone()))
    }

    fn columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        self.record("columns", table.as_str());
        Ok(self
            .table(table)
            .map(|entry| entry.columns.clone())
            .unwrap_or_default())
    }

    fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError> {
        self.record("table_exists", table.as_str());
        Ok(self.table(table).is_some())
    }

    fn registered_tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.record("registered_tables_with_prefix", prefix);
        if let Some(failure) = &self.discovery_failure {
            return Err(failure.clone());
        }
        Ok(self
            .tables
            .iter()
            .filter(|(name, entry)| name.starts_with(prefix) && entry.registered_geometry.is_some())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn sample_srid(
        &self,
        table: &Identifier,
        _geometry_column: &Identifier,
    ) -> Result<Option<Srid>, StoreError> {
        self.record("sample_srid", table.as_str());
        Ok(self.table(table).and_then(|entry| entry.srid))
    }

    fn intersect(&self, query: &IntersectionQuery<'_>) -> Result<Vec<IntersectionRow>, StoreError> {
        self.record("intersect", query.table.as_str());
        self.queries.lock().expect("queries lock").push(RecordedQuery {
            table: query.table.to_string(),
            geometry_column: query.geometry_column.to_string(),
            classification_column: query.classification_column.to_string(),
            srid: query.input.srid(),
            reprojected: query.input.is_reprojected(),
            limit: None,
        });

        let entry = self.queried_table(query.table)?;
        let dimension = query.input.dimension();

        Ok(entry
            .features
            .iter()
            .map(|feature| IntersectionRow {
                classification: feature.classification.clone(),
                input_dimension: Some(dimension),
                intersect_area: Some(if dimension == 2 { feature.area } else { 0.0 }),
                intersect_length: Some(if dimension == 1 { feature.length } else { 0.0 }),
            })
            .collect())
    }

    fn intersecting_features(&self, query: &FeatureQuery<'_>) -> Result<Vec<FeatureRow>, StoreError> {
        self.record("intersecting_features", query.table.as_str());
        self.queries.lock().expect("queries lock").push(RecordedQuery {
            table: query.table.to_string(),
            geometry_column: query.geometry_column.to_string(),
            classification_column: query.classification_column.to_string(),
            srid: query.input.srid(),
            reprojected: query.input.is_reprojected(),
            limit: Some(query.limit),
        });

        let entry = self.queried_table(query.table)?;
        let limit = usize::try_from(query.limit).unwrap_or_default();
        Ok(entry
            .features
            .iter()
            .take(limit)
            .map(|feature| FeatureRow {
                geojson: feature.geojson.clone(),
                classification: feature.classification.clone(),
            })
            .collect())
    }
}

pub(super) const TRIGNO_RULES: &str = r#"
datasets:
  - basin: trigno
    table: pai_trigno__idraulico
rank:
  trigno:
    idraulico: [PI1, PI2, PI3]
templates:
  trigno:
    idraulico:
      PI2: { template: tpl_trigno_pi2.docx, normativa: "Art. 10 NTA PAI" }
      PI3: { template: tpl_trigno_pi3.docx, normativa: "Art. 12 NTA PAI" }
"#;

pub(super) fn rules(yaml: &str) -> RuleConfig {
    RuleConfig::from_yaml(yaml).expect("rule document parses")
}

pub(super) fn trigno_store() -> MemoryStore {
    MemoryStore::default().with_table(
        "pai_trigno__idraulico",
        MemoryTable::hazard_layer(vec![feature("PI1", 1200.0), feature("PI2", 300.0)]),
    )
}

pub(super) fn build_service(
    store: MemoryStore,
    rules: RuleConfig,
) -> (Arc<HazardAnalysisService<MemoryStore>>, Arc<MemoryStore>) {
    let store = Arc::new(store);
    let service = Arc::new(HazardAnalysisService::new(
        store.clone(),
        Arc::new(RuleStore::from_rules(rules)),
    ));
    (service, store)
}

pub(super) fn polygon() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[14.60, 41.90], [14.62, 41.90], [14.62, 41.92], [14.60, 41.90]]]
    })
}

pub(super) fn point() -> Value {
    json!({ "type": "Point", "coordinates": [14.61, 41.91] })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
