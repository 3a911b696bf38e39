use pai_hazard::analysis::{AnalysisResult, DatasetResolution, Match};
use pai_hazard::error::AppError;
use std::fmt::Write as _;

/// Human readable summary of one analysis.
pub(crate) fn render_analysis(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let project = if result.project_name.is_empty() {
        "(unnamed project)"
    } else {
        result.project_name.as_str()
    };
    let _ = writeln!(out, "Hazard analysis: {project}");

    match &result.selected {
        Some(selected) => {
            let _ = writeln!(
                out,
                "- Selected: {} ({}) from {}/{} | rank {}",
                selected.classification,
                selected.study_type,
                selected.basin,
                selected.table,
                selected.rank
            );
            let _ = writeln!(
                out,
                "  Template: {} | Normativa: {}",
                selected.template.as_deref().unwrap_or("-"),
                selected.normativa.as_deref().unwrap_or("-")
            );
            let _ = writeln!(
                out,
                "  Overlap: {:.2} m2 | {:.2} m",
                selected.metrics.intersect_area, selected.metrics.intersect_length
            );
        }
        None => {
            let _ = writeln!(out, "- No hazard zone intersects the geometry");
        }
    }

    if !result.matches.is_empty() {
        let _ = writeln!(out, "Matches ({}):", result.matches.len());
        for found in &result.matches {
            let _ = writeln!(
                out,
                "  - {}/{}: {} ({})",
                found.basin, found.table, found.classification, found.study_type
            );
        }
    }

    if !result.warnings.is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in &result.warnings {
            let _ = writeln!(out, "  ! {warning}");
        }
    }

    out
}

/// One CSV row per intersecting feature.
pub(crate) fn render_matches_csv(matches: &[Match]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "basin",
            "table",
            "classification",
            "study_type",
            "intersect_area_m2",
            "intersect_length_m",
            "hit",
        ])
        .map_err(std::io::Error::from)?;

    for found in matches {
        writer
            .write_record([
                found.basin.clone(),
                found.table.clone(),
                found.classification.clone(),
                found.study_type.to_string(),
                found.metrics.intersect_area.to_string(),
                found.metrics.intersect_length.to_string(),
                found.metrics.hit.to_string(),
            ])
            .map_err(std::io::Error::from)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    String::from_utf8(bytes)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
}

pub(crate) fn render_datasets(resolution: &DatasetResolution) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Resolved datasets ({}):", resolution.datasets.len());
    for dataset in &resolution.datasets {
        let crs = if dataset.native_crs == 0 {
            "unknown".to_string()
        } else {
            format!("EPSG:{}", dataset.native_crs)
        };
        let _ = writeln!(
            out,
            "  - {}/{}: geometry={} classification={} crs={}",
            dataset.basin,
            dataset.table,
            dataset.geometry_column,
            dataset.classification_column,
            crs
        );
    }
    for warning in &resolution.warnings {
        let _ = writeln!(out, "  ! {warning}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pai_hazard::analysis::{Candidate, OverlapMetrics, SelectionResult, StudyType};

    fn sample_result() -> AnalysisResult {
        let metrics = OverlapMetrics {
            intersect_area: 312.5,
            intersect_length: 0.0,
            hit: true,
        };
        let found = Match {
            basin: "trigno".to_string(),
            table: "pai_trigno__idraulico".to_string(),
            classification: "PI2".to_string(),
            study_type: StudyType::Idraulico,
            metrics,
        };
        AnalysisResult {
            ok: true,
            project_name: "Ponte SS87".to_string(),
            candidates: vec![Candidate {
                basin: "trigno".to_string(),
                table: "pai_trigno__idraulico".to_string(),
            }],
            selected: Some(SelectionResult {
                basin: "trigno".to_string(),
                table: "pai_trigno__idraulico".to_string(),
                study_type: StudyType::Idraulico,
                classification: "PI2".to_string(),
                rank: 2,
                template: None,
                normativa: None,
                metrics,
            }),
            matches: vec![found],
            warnings: vec!["template not found for trigno/idraulico/PI2".to_string()],
        }
    }

    #[test]
    fn text_report_lists_selection_and_warnings() {
        let text = render_analysis(&sample_result());
        assert!(text.contains("Hazard analysis: Ponte SS87"));
        assert!(text.contains("Selected: PI2 (idraulico) from trigno/pai_trigno__idraulico | rank 2"));
        assert!(text.contains("Template: - | Normativa: -"));
        assert!(text.contains("312.50 m2"));
        assert!(text.contains("! template not found"));
    }

    #[test]
    fn empty_result_says_so() {
        let mut result = sample_result();
        result.selected = None;
        result.matches.clear();
        result.project_name.clear();
        let text = render_analysis(&result);
        assert!(text.contains("(unnamed project)"));
        assert!(text.contains("No hazard zone intersects"));
        assert!(!text.contains("Matches"));
    }

    #[test]
    fn csv_has_header_and_one_row_per_match() {
        let csv = render_matches_csv(&sample_result().matches).expect("csv renders");
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "basin,table,classification,study_type,intersect_area_m2,intersect_length_m,hit"
        );
        assert_eq!(lines[1], "trigno,pai_trigno__idraulico,PI2,idraulico,312.5,0,true");
        assert_eq!(lines.len(), 2);
    }
}
