use super::{RuleConfig, RuleConfigError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Immutable, shareable view of one load of the rule document.
#[derive(Debug)]
pub struct RuleSnapshot {
    pub rules: RuleConfig,
    pub loaded_at: DateTime<Utc>,
}

/// Process-wide holder of the parsed rule document.
///
/// The document is read on first use and then shared read-only by every
/// request. [`RuleStore::reload`] swaps in a freshly parsed snapshot; requests
/// already holding the previous snapshot finish with it.
#[derive(Debug)]
pub struct RuleStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Arc<RuleSnapshot>>>,
}

impl RuleStore {
    /// Lazily loads the document at `path` on first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            current: RwLock::new(None),
        }
    }

    /// Store pinned to an already parsed document; reloads keep it unchanged.
    pub fn from_rules(rules: RuleConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Some(Arc::new(RuleSnapshot {
                rules,
                loaded_at: Utc::now(),
            }))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the cached snapshot, loading it on first call.
    pub fn snapshot(&self) -> Result<Arc<RuleSnapshot>, RuleConfigError> {
        if let Some(snapshot) = self
            .current
            .read()
            .expect("rule store lock poisoned")
            .as_ref()
        {
            return Ok(snapshot.clone());
        }

        let mut guard = self.current.write().expect("rule store lock poisoned");
        if let Some(snapshot) = guard.as_ref() {
            return Ok(snapshot.clone());
        }

        let snapshot = self.load()?;
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Re-reads the document. On failure the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<RuleSnapshot>, RuleConfigError> {
        if self.path.is_none() {
            return self.snapshot();
        }

        let snapshot = self.load()?;
        *self.current.write().expect("rule store lock poisoned") = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn load(&self) -> Result<Arc<RuleSnapshot>, RuleConfigError> {
        let rules = match &self.path {
            Some(path) => RuleConfig::from_path(path)?,
            None => RuleConfig::default(),
        };

        info!(
            path = ?self.path,
            datasets = rules.datasets.len(),
            basins = rules.basins.len(),
            "hazard rules loaded"
        );

        Ok(Arc::new(RuleSnapshot {
            rules,
            loaded_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rules(file: &mut tempfile::NamedTempFile, body: &str) {
        let handle = file.as_file_mut();
        handle.set_len(0).expect("truncate");
        std::io::Seek::rewind(handle).expect("rewind");
        handle.write_all(body.as_bytes()).expect("write rules");
        handle.flush().expect("flush rules");
    }

    #[test]
    fn snapshot_is_cached_until_reload() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write_rules(
            &mut file,
            "datasets:\n  - basin: trigno\n    table: pai_trigno__idraulico\n",
        );

        let store = RuleStore::new(file.path());
        let first = store.snapshot().expect("initial load");
        assert_eq!(first.rules.datasets.len(), 1);

        write_rules(
            &mut file,
            "datasets:\n  - basin: trigno\n    table: pai_trigno__idraulico\n  - basin: biferno\n    table: pai_biferno__frane\n",
        );

        let cached = store.snapshot().expect("cached snapshot");
        assert!(Arc::ptr_eq(&first, &cached));

        let reloaded = store.reload().expect("reload succeeds");
        assert_eq!(reloaded.rules.datasets.len(), 2);
        assert!(Arc::ptr_eq(&reloaded, &store.snapshot().expect("new snapshot")));
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write_rules(&mut file, "basins:\n  trigno: {}\n");

        let store = RuleStore::new(file.path());
        let first = store.snapshot().expect("initial load");

        write_rules(&mut file, "basins: [\n");
        assert!(store.reload().is_err());

        let current = store.snapshot().expect("snapshot still available");
        assert!(Arc::ptr_eq(&first, &current));
    }

    #[test]
    fn pinned_rules_survive_reload() {
        let rules = RuleConfig::from_yaml("basins:\n  trigno: {}\n").expect("rules parse");
        let store = RuleStore::from_rules(rules.clone());
        let reloaded = store.reload().expect("reload is a no-op");
        assert_eq!(reloaded.rules, rules);
        assert!(store.path().is_none());
    }
}
