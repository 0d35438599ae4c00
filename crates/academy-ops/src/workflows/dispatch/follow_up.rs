use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::channel::{DeliveryReport, Notifier};
use super::job::{DispatchError, DispatchJob};
use super::messages;
use crate::store::{PersistedState, StateStore, StoreError};
use crate::workflows::prospects::{compute_offer, FollowUpPolicy, Prospect, ProspectId};
use crate::workflows::sessions::domain::Formation;

/// One discounted offer per prospect, sent once the training start is close enough.
pub struct ProspectFollowUp<S> {
    store: Arc<S>,
    notifier: Arc<Notifier>,
    policy: FollowUpPolicy,
}

impl<S> ProspectFollowUp<S>
where
    S: StateStore,
{
    pub fn new(store: Arc<S>, notifier: Arc<Notifier>, policy: FollowUpPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }
}

fn find<'a>(state: &'a PersistedState, id: &ProspectId) -> Result<&'a Prospect, StoreError> {
    state
        .prospect(id)
        .ok_or_else(|| StoreError::NotFound(format!("prospect {id}")))
}

impl<S> DispatchJob for ProspectFollowUp<S>
where
    S: StateStore,
{
    type Target = ProspectId;

    fn name(&self) -> &'static str {
        "prospect follow-ups"
    }

    fn targets(&self, state: &PersistedState) -> Vec<ProspectId> {
        state
            .prospects
            .iter()
            .filter(|prospect| !prospect.sent)
            .map(|prospect| prospect.id.clone())
            .collect()
    }

    fn compute_trigger_date(
        &self,
        state: &PersistedState,
        target: &ProspectId,
    ) -> Result<NaiveDate, DispatchError> {
        let prospect = find(state, target)?;
        let start = prospect
            .training_start_date()
            .ok_or_else(|| DispatchError::NoTriggerDate(format!("prospect {target} training start")))?;
        Duration::try_days(self.policy.days_before)
            .and_then(|lead| start.checked_sub_signed(lead))
            .ok_or_else(|| DispatchError::NoTriggerDate(format!("prospect {target} training start")))
    }

    /// Unlike jury reminders, a missed trigger day is caught up on the next tick.
    fn is_due(&self, trigger: NaiveDate, today: NaiveDate) -> bool {
        today >= trigger
    }

    fn already_dispatched(
        &self,
        state: &PersistedState,
        target: &ProspectId,
    ) -> Result<bool, DispatchError> {
        Ok(find(state, target)?.sent)
    }

    fn attempt_send(
        &self,
        target: &ProspectId,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport, DispatchError> {
        let policy = self.policy;
        let (prospect, message) = self.store.update_prospect(target, |prospect| {
            if prospect.sent {
                return Err(DispatchError::AlreadySent);
            }
            let formation = Formation::from_code(&prospect.formation)
                .ok_or_else(|| DispatchError::UnknownFormation(prospect.formation.clone()))?;
            let start = prospect.training_start_date().ok_or_else(|| {
                DispatchError::NoTriggerDate(format!("prospect {target} training start"))
            })?;

            let offer = compute_offer(formation.base_price(), prospect.cpf, &policy);
            prospect.proposed_price = Some(offer.price);
            prospect.proposed_discount = Some(offer.discount_percent);
            prospect.mark_attempted(now);

            let message = messages::follow_up_offer(prospect, formation, start, &offer);
            Ok((prospect.clone(), message))
        })?;

        Ok(self.notifier.deliver(
            prospect.email.as_deref(),
            prospect.phone.as_deref(),
            &message,
        ))
    }

    fn record_outcome(
        &self,
        target: &ProspectId,
        report: &DeliveryReport,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.store.update_prospect(target, |prospect| {
            match report.error_summary() {
                None => prospect.mark_sent(now),
                Some(error) => prospect.record_failure(error),
            }
            Ok::<_, DispatchError>(())
        })
    }

    fn record_error(&self, target: &ProspectId, error: &DispatchError, now: DateTime<Utc>) {
        if matches!(error, DispatchError::Store(StoreError::NotFound(_))) {
            return;
        }
        let text = error.to_string();
        let result = self.store.update_prospect(target, |prospect| {
            prospect.mark_attempted(now);
            prospect.record_failure(text);
            Ok::<_, StoreError>(())
        });
        if let Err(nested) = result {
            tracing::warn!(prospect_id = %target, error = %nested, "could not record dispatch error");
        }
    }
}
