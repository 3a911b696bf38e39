//! Parsed form of the YAML rule document driving dataset discovery, ranking
//! and template selection.

mod store;

pub use store::{RuleSnapshot, RuleStore};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Severity lists keyed by basin, then study type. Entries run least to most severe.
pub type RankTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Templates keyed by basin, study type, then classification code.
pub type TemplateTable = BTreeMap<String, BTreeMap<String, BTreeMap<String, TemplateEntry>>>;

/// The whole rule document. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub datasets: Vec<DatasetHint>,
    pub basins: BTreeMap<String, BasinHint>,
    #[serde(deserialize_with = "deserialize_rank_table")]
    pub rank: RankTable,
    pub templates: TemplateTable,
    pub detection: DetectionRules,
}

/// One explicitly configured hazard table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetHint {
    #[serde(alias = "bacino")]
    pub basin: Option<String>,
    pub table: Option<String>,
    #[serde(alias = "geometry_column")]
    pub geom_col: Option<String>,
    #[serde(alias = "pericol_col", alias = "classification_column")]
    pub class_col: Option<String>,
}

/// Basin whose tables are discovered by name prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinHint {
    pub table_prefix: Option<String>,
    #[serde(alias = "geometry_column")]
    pub geom_col: Option<String>,
    #[serde(alias = "pericol_col", alias = "classification_column")]
    pub class_col: Option<String>,
}

impl BasinHint {
    /// Prefix used to discover the basin's tables; `pai_<basin>__` unless overridden.
    pub fn prefix_for(&self, basin: &str) -> String {
        match self.table_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => prefix.to_string(),
            _ => format!("pai_{}__", basin.trim().to_lowercase()),
        }
    }
}

/// Output document and regulatory citation for one classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateEntry {
    pub template: Option<String>,
    pub normativa: Option<String>,
}

/// Ordered name lists consulted by the schema introspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRules {
    pub geometry_names: Vec<String>,
    pub classification_names: Vec<String>,
    pub classification_fragments: Vec<String>,
}

const GEOMETRY_NAMES: &[&str] = &["geom", "wkb_geometry", "geometry"];

const CLASSIFICATION_NAMES: &[&str] = &[
    "pericolosita",
    "pericolosità",
    "classe",
    "class",
    "hazard",
    "rischio",
    "risk",
    "zona",
    "cod_zona",
    "codice",
    "cod",
    "peric_idr",
    "peric_sint",
    "peric_tot",
];

const CLASSIFICATION_FRAGMENTS: &[&str] = &["peri", "haz", "risc", "classe"];

impl Default for DetectionRules {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            geometry_names: owned(GEOMETRY_NAMES),
            classification_names: owned(CLASSIFICATION_NAMES),
            classification_fragments: owned(CLASSIFICATION_FRAGMENTS),
        }
    }
}

/// Failure to read or parse the rule document.
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    #[error("failed to read rule document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Canonical form of a classification code: trimmed and uppercased.
pub fn normalize_classification(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl RuleConfig {
    /// Reads a rule document. A missing file yields an empty document.
    pub fn from_path(path: &Path) -> Result<Self, RuleConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "rule document not found, using empty rule set");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| RuleConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&text).map_err(|source| RuleConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses YAML text and normalizes every lookup key.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<RuleConfig> = serde_yaml::from_str(text)?;
        Ok(parsed.unwrap_or_default().normalized())
    }

    /// Lowercases basin and study-type keys and canonicalizes classification codes.
    pub fn normalized(self) -> Self {
        let rank = self
            .rank
            .into_iter()
            .map(|(basin, studies)| {
                let studies = studies
                    .into_iter()
                    .map(|(study, order)| {
                        let order = order
                            .iter()
                            .map(|code| normalize_classification(code))
                            .collect();
                        (normalize_key(&study), order)
                    })
                    .collect();
                (normalize_key(&basin), studies)
            })
            .collect();

        let templates = self
            .templates
            .into_iter()
            .map(|(basin, studies)| {
                let studies = studies
                    .into_iter()
                    .map(|(study, entries)| {
                        let entries = entries
                            .into_iter()
                            .map(|(code, entry)| (normalize_classification(&code), entry))
                            .collect();
                        (normalize_key(&study), entries)
                    })
                    .collect();
                (normalize_key(&basin), studies)
            })
            .collect();

        Self {
            rank,
            templates,
            ..self
        }
    }

    /// True when at least one dataset source (explicit or by basin) is configured.
    pub fn has_datasets(&self) -> bool {
        !self.datasets.is_empty() || !self.basins.is_empty()
    }

    /// Configured severity order for a basin and study type, if any.
    pub fn rank_order(&self, basin: &str, study_type: &str) -> Option<&[String]> {
        self.rank
            .get(&normalize_key(basin))
            .and_then(|studies| studies.get(&normalize_key(study_type)))
            .map(Vec::as_slice)
    }

    /// Configured template for a classification, if any.
    pub fn template(
        &self,
        basin: &str,
        study_type: &str,
        classification: &str,
    ) -> Option<&TemplateEntry> {
        self.templates
            .get(&normalize_key(basin))
            .and_then(|studies| studies.get(&normalize_key(study_type)))
            .and_then(|entries| entries.get(&normalize_classification(classification)))
    }
}

/// Severity lists may hold bare YAML numbers (`[1, 2, 3]`); they are read as text.
fn deserialize_rank_table<'de, D>(deserializer: D) -> Result<RankTable, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    let raw = Option::<BTreeMap<String, Option<BTreeMap<String, Vec<Code>>>>>::deserialize(
        deserializer,
    )?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(basin, studies)| {
            let studies = studies
                .unwrap_or_default()
                .into_iter()
                .map(|(study, codes)| {
                    let codes = codes
                        .into_iter()
                        .map(|code| match code {
                            Code::Text(text) => text,
                            Code::Integer(value) => value.to_string(),
                            Code::Float(value) => value.to_string(),
                        })
                        .collect();
                    (study, codes)
                })
                .collect();
            (basin, studies)
        })
        .collect())
}
