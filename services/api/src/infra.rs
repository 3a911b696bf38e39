use metrics_exporter_prometheus::PrometheusHandle;
use pai_hazard::analysis::HazardAnalysisService;
use pai_hazard::config::AppConfig;
use pai_hazard::error::AppError;
use pai_hazard::rules::RuleStore;
use pai_hazard::store::PostgisStore;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type HazardService = HazardAnalysisService<PostgisStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Loads the environment configuration, letting the CLI pick another rule document.
pub(crate) fn load_config(rules: Option<PathBuf>) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = rules {
        config.rules.path = path;
    }
    Ok(config)
}

/// Wires the PostGIS store and the rule cache into the analysis service.
pub(crate) async fn build_service(config: &AppConfig) -> Result<Arc<HazardService>, AppError> {
    let database = config.database.clone();
    let store = tokio::task::spawn_blocking(move || PostgisStore::connect(&database)).await??;
    let rules = Arc::new(RuleStore::new(config.rules.path.clone()));

    Ok(Arc::new(HazardAnalysisService::new(Arc::new(store), rules)))
}
