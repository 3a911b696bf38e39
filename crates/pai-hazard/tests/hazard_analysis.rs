use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pai_hazard::analysis::{
    AnalysisError, AnalysisResult, HazardAnalyzer, HazardRanker, Identifier, Rank, Srid,
    StudyType,
};
use pai_hazard::rules::RuleConfig;
use pai_hazard::store::{
    ColumnInfo, FeatureQuery, FeatureRow, IntersectionQuery, IntersectionRow, SpatialStore,
    StoreError,
};
use serde_json::{json, Value};

/// Every table is a registered layer in UTM 33N whose zones all intersect the input.
#[derive(Default)]
struct ZoneLayers {
    zones: HashMap<String, Vec<&'static str>>,
    calls: AtomicUsize,
}

impl ZoneLayers {
    fn with_layer(mut self, table: &str, zones: Vec<&'static str>) -> Self {
        self.zones.insert(table.to_string(), zones);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl SpatialStore for ZoneLayers {
    fn registered_geometry_column(
        &self,
        table: &Identifier,
    ) -> Result<Option<String>, StoreError> {
        self.touch();
        Ok(self.zones.get(table.as_str()).map(|_| "geom".to_string()))
    }

    fn columns(&self, _table: &Identifier) -> Result<Vec<ColumnInfo>, StoreError> {
        self.touch();
        Ok(vec![
            ColumnInfo::new("pericolosita", "varchar"),
            ColumnInfo::new("geom", "geometry"),
        ])
    }

    fn table_exists(&self, table: &Identifier) -> Result<bool, StoreError> {
        self.touch();
        Ok(self.zones.contains_key(table.as_str()))
    }

    fn registered_tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.touch();
        let mut tables: Vec<String> = self
            .zones
            .keys()
            .filter(|table| table.starts_with(prefix))
            .cloned()
            .collect();
        tables.sort();
        Ok(tables)
    }

    fn sample_srid(
        &self,
        _table: &Identifier,
        _geometry_column: &Identifier,
    ) -> Result<Option<Srid>, StoreError> {
        self.touch();
        Ok(Some(32633))
    }

    fn intersect(&self, query: &IntersectionQuery<'_>) -> Result<Vec<IntersectionRow>, StoreError> {
        self.touch();
        let dimension = query.input.dimension();

        Ok(self
            .zones
            .get(query.table.as_str())
            .map(|zones| {
                zones
                    .iter()
                    .map(|zone| IntersectionRow {
                        classification: Some(zone.to_string()),
                        input_dimension: Some(dimension),
                        intersect_area: Some(if dimension == 2 { 250.0 } else { 0.0 }),
                        intersect_length: Some(if dimension == 1 { 25.0 } else { 0.0 }),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn intersecting_features(&self, query: &FeatureQuery<'_>) -> Result<Vec<FeatureRow>, StoreError> {
        self.touch();
        Ok(self
            .zones
            .get(query.table.as_str())
            .map(|zones| {
                zones
                    .iter()
                    .map(|zone| FeatureRow {
                        geojson: Some(r#"{"type":"Point","coordinates":[14.61,41.91]}"#.to_string()),
                        classification: Some(zone.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn polygon() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[14.60, 41.90], [14.62, 41.90], [14.62, 41.92], [14.60, 41.90]]]
    })
}

fn rules(yaml: &str) -> RuleConfig {
    RuleConfig::from_yaml(yaml).expect("rule document parses")
}

fn analyze(store: ZoneLayers, rules: &RuleConfig, geometry: Value, hint: &str) -> AnalysisResult {
    HazardAnalyzer::new(Arc::new(store))
        .analyze(rules, &geometry, "Nuovo ponte", hint)
        .expect("analysis succeeds")
}

const TRIGNO: &str = r#"
datasets:
  - basin: trigno
    table: pai_trigno__idraulico
rank:
  trigno:
    idraulico: [PI1, PI2]
templates:
  trigno:
    idraulico:
      PI2: { template: tpl_pi2.docx, normativa: "Art. 10 NTA PAI" }
"#;

#[test]
fn unconfigured_rules_fail_before_any_query() {
    let store = Arc::new(ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI1"]));
    let analyzer = HazardAnalyzer::new(store.clone());

    let error = analyzer
        .analyze(&RuleConfig::default(), &polygon(), "Nuovo ponte", "")
        .expect_err("no datasets configured");

    assert!(matches!(error, AnalysisError::Configuration(_)));
    assert_eq!(store.calls(), 0);
}

#[test]
fn malformed_geometry_fails_before_any_query() {
    let store = Arc::new(ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI1"]));
    let analyzer = HazardAnalyzer::new(store.clone());

    let error = analyzer
        .analyze(&rules(TRIGNO), &json!({ "type": "Polygon" }), "Nuovo ponte", "")
        .expect_err("coordinates required");

    assert_eq!(error.kind(), "InputError");
    assert_eq!(store.calls(), 0);
}

#[test]
fn no_intersection_is_a_successful_empty_result() {
    let store = ZoneLayers::default().with_layer("pai_trigno__idraulico", vec![]);

    let result = analyze(store, &rules(TRIGNO), polygon(), "auto");

    assert!(result.ok);
    assert!(result.candidates.is_empty());
    assert!(result.selected.is_none());
    assert!(!result.warnings.is_empty());
}

#[test]
fn higher_configured_position_is_selected() {
    let store = ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI1", "PI2"]);

    let result = analyze(store, &rules(TRIGNO), polygon(), "");

    let selected = result.selected.expect("selection");
    assert_eq!(selected.classification, "PI2");
    assert_eq!(selected.rank, 2);
    assert_eq!(selected.template.as_deref(), Some("tpl_pi2.docx"));
    assert_eq!(selected.metrics.intersect_area, 250.0);
}

#[test]
fn point_input_reports_only_a_hit() {
    let store = ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI2"]);

    let result = analyze(
        store,
        &rules(TRIGNO),
        json!({ "type": "Point", "coordinates": [14.61, 41.91] }),
        "",
    );

    let value = serde_json::to_value(&result).expect("result serializes");
    let metrics = &value["selected"]["metrics"];
    assert_eq!(metrics["intersect_area_m2"], 0.0);
    assert_eq!(metrics["intersect_length_m"], 0.0);
    assert_eq!(metrics["hit"], true);
}

#[test]
fn unmatched_study_hint_falls_back_to_all_matches() {
    let store = ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI1", "PI2"]);

    let result = analyze(store, &rules(TRIGNO), polygon(), "idrogeologico");

    let selected = result.selected.expect("selection");
    assert_eq!(selected.study_type, StudyType::Idraulico);
    assert_eq!(selected.classification, "PI2");
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("study_hint 'idrogeologico'")));
}

#[test]
fn study_hint_filters_mixed_layers() {
    let store = ZoneLayers::default()
        .with_layer("pai_biferno__idraulico", vec!["PI3"])
        .with_layer("pai_biferno__frane", vec!["PF1"]);
    let rules = rules("basins:\n  biferno: {}\n");

    let result = analyze(store, &rules, polygon(), "idrogeologico");

    let selected = result.selected.expect("selection");
    assert_eq!(selected.classification, "PF1");
    assert_eq!(selected.study_type, StudyType::Idrogeologico);
    assert_eq!(result.candidates.len(), 2);
}

#[test]
fn missing_template_is_a_warning() {
    let store = ZoneLayers::default().with_layer("pai_trigno__idraulico", vec!["PI1"]);

    let result = analyze(store, &rules(TRIGNO), polygon(), "");

    let selected = result.selected.expect("selection");
    assert_eq!(selected.classification, "PI1");
    assert!(selected.template.is_none());
    assert!(selected.normativa.is_none());
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("template not found")));
}

#[test]
fn numeric_convention_ranks_unconfigured_codes() {
    let rules = RuleConfig::default();
    let ranker = HazardRanker::new(&rules);

    for (code, expected) in [("PF3", 3), ("PI1", 1), ("B2", 2), ("XYZ", 0)] {
        let rank = ranker.rank("trigno", StudyType::infer(code), code);
        assert_eq!(rank.value(), expected, "{code}");
    }
}

#[test]
fn configured_codes_outrank_conventional_ones() {
    let rules = rules("rank:\n  trigno:\n    idrogeologico: [PF1, PF2]\n");
    let ranker = HazardRanker::new(&rules);

    let listed = ranker.rank("trigno", StudyType::Idrogeologico, "PF1");
    let unlisted = ranker.rank("trigno", StudyType::Idrogeologico, "PF4");

    assert!(matches!(listed, Rank::Configured(1)));
    assert!(listed > unlisted);
}

#[test]
fn study_type_inference_follows_code_conventions() {
    assert_eq!(StudyType::infer("PF2"), StudyType::Idrogeologico);
    assert_eq!(StudyType::infer("PI1"), StudyType::Idraulico);
    assert_eq!(StudyType::infer("A"), StudyType::Idraulico);
    assert_eq!(StudyType::infer("UNKNOWN"), StudyType::Auto);
}

#[test]
fn dataset_order_does_not_change_the_selected_rank() {
    let forward = r#"
datasets:
  - { basin: trigno, table: pai_trigno__idraulico }
  - { basin: trigno, table: pai_trigno__frane }
"#;
    let reverse = r#"
datasets:
  - { basin: trigno, table: pai_trigno__frane }
  - { basin: trigno, table: pai_trigno__idraulico }
"#;
    let layers = || {
        ZoneLayers::default()
            .with_layer("pai_trigno__idraulico", vec!["PI1", "PI3"])
            .with_layer("pai_trigno__frane", vec!["PF2"])
    };

    let first = analyze(layers(), &rules(forward), polygon(), "");
    let second = analyze(layers(), &rules(reverse), polygon(), "");

    let first = first.selected.expect("selection");
    let second = second.selected.expect("selection");
    assert_eq!(first.rank, second.rank);
    assert_eq!(first.classification, "PI3");
    assert_eq!(second.classification, "PI3");
}

#[test]
fn equal_ranks_keep_the_first_encountered_match() {
    let rules = rules(
        r#"
datasets:
  - { basin: trigno, table: pai_trigno__idraulico }
  - { basin: trigno, table: pai_trigno__bis }
rank:
  trigno:
    idraulico: [PI1, PI2]
"#,
    );
    let store = ZoneLayers::default()
        .with_layer("pai_trigno__idraulico", vec!["PI1", "PI2"])
        .with_layer("pai_trigno__bis", vec!["PI2"]);

    let result = analyze(store, &rules, polygon(), "");

    let selected = result.selected.expect("selection");
    assert_eq!(selected.table, "pai_trigno__idraulico");
    assert_eq!(selected.classification, "PI2");
    assert_eq!(selected.rank, 2);
    assert_eq!(result.candidates.len(), 2);
}

#[test]
fn feature_export_tags_each_zone_with_its_dataset() {
    let store = ZoneLayers::default()
        .with_layer("pai_trigno__idraulico", vec!["PI2"])
        .with_layer("pai_trigno__frane", vec!["PF1"]);
    let rules = rules(
        r#"
datasets:
  - { basin: trigno, table: pai_trigno__idraulico }
  - { basin: trigno, table: pai_trigno__frane }
"#,
    );

    let result = HazardAnalyzer::new(Arc::new(store))
        .intersecting_features(&rules, &polygon(), &[], 500)
        .expect("export succeeds");

    assert_eq!(result.count, 2);
    let classes: Vec<_> = result
        .fc
        .features
        .iter()
        .map(|feature| {
            (
                feature.properties.table.as_str(),
                feature.properties.classification.as_deref(),
                feature.properties.study_type,
            )
        })
        .collect();
    assert_eq!(
        classes,
        vec![
            ("pai_trigno__idraulico", Some("PI2"), StudyType::Idraulico),
            ("pai_trigno__frane", Some("PF1"), StudyType::Idrogeologico),
        ]
    );
}
