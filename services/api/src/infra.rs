use academy_ops::config::{AppConfig, SchedulingConfig};
use academy_ops::error::AppError;
use academy_ops::store::{JsonFileStore, StateStore};
use academy_ops::workflows::dispatch::{DispatchEngine, Notifier};
use academy_ops::workflows::prospects::ProspectService;
use academy_ops::workflows::sessions::SessionService;
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Services sharing one store and one notifier.
pub(crate) struct Services<S = JsonFileStore> {
    pub(crate) sessions: Arc<SessionService<S>>,
    pub(crate) prospects: Arc<ProspectService<S>>,
    pub(crate) engine: Arc<DispatchEngine<S>>,
}

impl Services<JsonFileStore> {
    /// Opens the configured state file and builds channels from the environment.
    pub(crate) fn assemble(config: &AppConfig) -> Result<Self, AppError> {
        let path = config.storage.state_path();
        let store = Arc::new(JsonFileStore::open(path.clone())?);
        tracing::info!(path = %path.display(), "state file opened");
        let notifier = Arc::new(Notifier::from_config(&config.notifications));
        Ok(Self::with_store(store, notifier, config.scheduling.clone()))
    }
}

impl<S> Services<S>
where
    S: StateStore + 'static,
{
    pub(crate) fn with_store(
        store: Arc<S>,
        notifier: Arc<Notifier>,
        scheduling: SchedulingConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionService::new(
                store.clone(),
                notifier.clone(),
                scheduling.clone(),
            )),
            prospects: Arc::new(ProspectService::new(store.clone())),
            engine: Arc::new(DispatchEngine::new(store, notifier, scheduling)),
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Midday UTC on `day`, so any European business timezone still sees `day`.
pub(crate) fn instant_for(day: Option<NaiveDate>) -> DateTime<Utc> {
    day.and_then(|day| day.and_hms_opt(12, 0, 0))
        .map(|moment| moment.and_utc())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2025-03-15 ").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert!(parse_date("15/03/2025").unwrap_err().contains("15/03/2025"));
    }

    #[test]
    fn instant_for_lands_on_the_requested_day() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(instant_for(Some(day)).date_naive(), day);
    }
}
