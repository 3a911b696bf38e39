use super::ranking::StudyType;
use crate::rules::{RuleConfig, TemplateEntry};

/// Maps a (basin, study type, classification) triple to its configured template.
pub struct TemplateResolver<'a> {
    rules: &'a RuleConfig,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(rules: &'a RuleConfig) -> Self {
        Self { rules }
    }

    /// `None` when any level of the lookup is missing; callers warn, never fail.
    pub fn resolve(
        &self,
        basin: &str,
        study_type: StudyType,
        classification: &str,
    ) -> Option<&'a TemplateEntry> {
        self.rules
            .template(basin, study_type.as_str(), classification)
    }
}
