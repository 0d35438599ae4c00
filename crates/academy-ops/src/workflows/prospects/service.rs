use std::sync::Arc;

use super::domain::{NewProspect, Prospect, ProspectId};
use crate::dates;
use crate::store::{StateStore, StoreError};
use crate::workflows::sessions::domain::Formation;

/// Registration and listing of follow-up prospects.
pub struct ProspectService<S> {
    store: Arc<S>,
}

impl<S> ProspectService<S>
where
    S: StateStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn register(&self, request: NewProspect) -> Result<Prospect, ProspectServiceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ProspectServiceError::Invalid("name is required".to_string()));
        }
        if Formation::from_code(&request.formation).is_none() {
            return Err(ProspectServiceError::Invalid(format!(
                "unknown formation '{}'",
                request.formation
            )));
        }
        if let Some(raw) = request.training_start.as_deref() {
            if dates::parse_date(raw).is_none() {
                tracing::warn!(value = raw, "prospect training start will not trigger a follow-up");
            }
        }

        let prospect = Prospect {
            id: ProspectId::generate(),
            formation: request.formation.trim().to_ascii_lowercase(),
            name,
            email: non_empty(request.email),
            phone: non_empty(request.phone),
            cpf: request.cpf,
            training_start: non_empty(request.training_start),
            ..Prospect::default()
        };

        let stored = prospect.clone();
        self.store.transact(move |state| {
            state.prospects.push(prospect);
            Ok::<_, StoreError>(())
        })?;
        tracing::info!(prospect_id = %stored.id, formation = %stored.formation, "registered prospect");
        Ok(stored)
    }

    pub fn list(&self) -> Result<Vec<Prospect>, ProspectServiceError> {
        Ok(self.store.snapshot()?.prospects)
    }

    pub fn get(&self, id: &ProspectId) -> Result<Prospect, ProspectServiceError> {
        self.store
            .snapshot()?
            .prospect(id)
            .cloned()
            .ok_or_else(|| ProspectServiceError::NotFound(id.clone()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ProspectServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid prospect: {0}")]
    Invalid(String),
    #[error("prospect {0} not found")]
    NotFound(ProspectId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn request() -> NewProspect {
        NewProspect {
            formation: "APS".to_string(),
            name: "  Nadia Benali ".to_string(),
            email: Some("nadia@example.org".to_string()),
            phone: Some("  ".to_string()),
            cpf: 500.0,
            training_start: Some("2025-04-01".to_string()),
        }
    }

    #[test]
    fn register_normalizes_and_persists() {
        let store = Arc::new(MemoryStore::default());
        let service = ProspectService::new(store.clone());

        let prospect = service.register(request()).expect("registered");
        assert_eq!(prospect.name, "Nadia Benali");
        assert_eq!(prospect.formation, "aps");
        assert!(prospect.phone.is_none());
        assert!(!prospect.sent);

        let listed = service.list().unwrap();
        assert_eq!(listed, vec![prospect.clone()]);
        assert_eq!(service.get(&prospect.id).unwrap(), prospect);
    }

    #[test]
    fn register_rejects_unknown_formation() {
        let service = ProspectService::new(Arc::new(MemoryStore::default()));
        let mut request = request();
        request.formation = "forklift".to_string();
        assert!(matches!(
            service.register(request),
            Err(ProspectServiceError::Invalid(_))
        ));
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn get_reports_missing_prospect() {
        let service = ProspectService::new(Arc::new(MemoryStore::default()));
        let missing = ProspectId("nope".to_string());
        assert!(matches!(
            service.get(&missing),
            Err(ProspectServiceError::NotFound(id)) if id == missing
        ));
    }
}
