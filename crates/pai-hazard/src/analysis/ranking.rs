use super::intersection::Match;
use super::AnalysisError;
use crate::rules::{normalize_classification, RuleConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Regulatory discipline a classification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyType {
    Idraulico,
    Idrogeologico,
    Auto,
}

impl StudyType {
    pub fn as_str(self) -> &'static str {
        match self {
            StudyType::Idraulico => "idraulico",
            StudyType::Idrogeologico => "idrogeologico",
            StudyType::Auto => "auto",
        }
    }

    /// Derives the study type from the classification code alone.
    ///
    /// `PF*` is landslide (idrogeologico); `PI*`, `B<n>`, the single-letter
    /// zones `A`/`B`/`C` and codes with an embedded ` - ` separator are flood
    /// (idraulico); anything else is `auto`.
    pub fn infer(classification: &str) -> Self {
        let code = normalize_classification(classification);
        if code.starts_with("PF") {
            return StudyType::Idrogeologico;
        }
        if code.starts_with("PI")
            || matches!(code.as_str(), "A" | "B" | "C")
            || numbered(&code, "B").is_some()
            || code.contains(" - ")
        {
            return StudyType::Idraulico;
        }
        StudyType::Auto
    }

    /// Parses the caller's study hint; empty means `auto`.
    pub fn parse_hint(raw: &str) -> Result<Self, AnalysisError> {
        match raw.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(StudyType::Auto),
            "idraulico" => Ok(StudyType::Idraulico),
            "idrogeologico" => Ok(StudyType::Idrogeologico),
            other => Err(AnalysisError::Input(format!(
                "study_hint must be one of auto, idraulico, idrogeologico (found '{other}')"
            ))),
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a classification; higher is more severe.
///
/// Variants are ordered so that any code found in a configured severity list
/// outranks every code ranked by naming convention, which in turn outranks
/// unranked codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Unranked,
    /// Digits following a `PF`, `PI` or `B` prefix.
    Conventional(u32),
    /// 1-based position in the configured severity list.
    Configured(u32),
}

impl Rank {
    /// Numeric rank as reported to callers: list position, code digits, or 0.
    pub fn value(self) -> u32 {
        match self {
            Rank::Unranked => 0,
            Rank::Conventional(value) | Rank::Configured(value) => value,
        }
    }
}

fn numbered(code: &str, prefix: &str) -> Option<u32> {
    let digits = code.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Outcome of [`HazardRanker::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'m> {
    pub chosen: Option<&'m Match>,
    pub rank: Rank,
    pub warnings: Vec<String>,
}

/// Orders classifications with the configured severity lists and the
/// numeric naming convention as fallback.
pub struct HazardRanker<'a> {
    rules: &'a RuleConfig,
}

impl<'a> HazardRanker<'a> {
    pub fn new(rules: &'a RuleConfig) -> Self {
        Self { rules }
    }

    pub fn rank(&self, basin: &str, study_type: StudyType, classification: &str) -> Rank {
        let code = normalize_classification(classification);

        if let Some(order) = self.rules.rank_order(basin, study_type.as_str()) {
            if let Some(position) = order.iter().position(|entry| *entry == code) {
                return Rank::Configured(position as u32 + 1);
            }
        }

        ["PF", "PI", "B"]
            .iter()
            .find_map(|prefix| numbered(&code, prefix))
            .map(Rank::Conventional)
            .unwrap_or(Rank::Unranked)
    }

    /// Picks the most severe match, honouring the study hint when it leaves
    /// any candidate. Equal ranks keep the first match encountered.
    pub fn select<'m>(&self, matches: &'m [Match], hint: StudyType) -> Selection<'m> {
        let mut warnings = Vec::new();

        let mut eligible: Vec<&Match> = match hint {
            StudyType::Auto => matches.iter().collect(),
            wanted => matches
                .iter()
                .filter(|candidate| candidate.study_type == wanted)
                .collect(),
        };

        if eligible.is_empty() && !matches.is_empty() {
            warnings.push(format!(
                "no intersection consistent with study_hint '{hint}'; using all intersections"
            ));
            eligible = matches.iter().collect();
        }

        let mut chosen: Option<(&Match, Rank)> = None;
        for candidate in eligible {
            let rank = self.rank(
                &candidate.basin,
                candidate.study_type,
                &candidate.classification,
            );
            match chosen {
                Some((_, best)) if rank <= best => {}
                _ => chosen = Some((candidate, rank)),
            }
        }

        let basins: BTreeSet<&str> = matches.iter().map(|m| m.basin.as_str()).collect();
        if basins.len() > 1 {
            let listed = basins.into_iter().collect::<Vec<_>>().join(", ");
            warnings.push(format!(
                "intersection spans multiple basins ({listed}); verify the selected basin"
            ));
        }

        Selection {
            chosen: chosen.map(|(candidate, _)| candidate),
            rank: chosen.map(|(_, rank)| rank).unwrap_or(Rank::Unranked),
            warnings,
        }
    }
}
