use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::catalog::RuleCatalog;
use super::deadline::{classify, resolve, Deadline};
use super::domain::{Anchor, SessionError, StepStatus};
use super::invitation::{InvitationId, JuryInvitation};
use crate::dates::{self, lenient_timestamp};

/// Identifier wrapper for tracked sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One checklist entry of a session, keyed by catalog rule name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInstance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, with = "lenient_timestamp")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_date: Option<String>,
}

impl StepInstance {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: SessionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub formation: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub exam_date: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub steps: Vec<StepInstance>,
    #[serde(default)]
    pub jurys: Vec<JuryInvitation>,
}

impl Session {
    /// Builds a session seeded with one pending step per catalog rule.
    pub fn new(
        id: SessionId,
        name: String,
        formation: String,
        start_date: Option<String>,
        exam_date: Option<String>,
        catalog: &RuleCatalog,
    ) -> Self {
        let mut session = Self {
            id,
            name,
            formation,
            start_date,
            exam_date,
            ..Self::default()
        };
        session.sync_steps(catalog);
        session
    }

    pub fn catalog(&self) -> RuleCatalog {
        RuleCatalog::for_code(&self.formation)
    }

    pub fn anchor_date(&self, anchor: Anchor) -> Option<NaiveDate> {
        match anchor {
            Anchor::Start => dates::parse_optional(self.start_date.as_deref(), "start_date"),
            Anchor::Exam => dates::parse_optional(self.exam_date.as_deref(), "exam_date"),
        }
    }

    /// Appends an instance for every catalog rule that has none yet.
    ///
    /// Existing instances keep their position and state, including ones whose
    /// rule has since been removed from the catalog. Returns how many were added.
    pub fn sync_steps(&mut self, catalog: &RuleCatalog) -> usize {
        let missing: Vec<StepInstance> = catalog
            .rules()
            .iter()
            .filter(|rule| !self.steps.iter().any(|step| step.name == rule.name))
            .map(|rule| StepInstance::pending(rule.name))
            .collect();
        let added = missing.len();
        self.steps.extend(missing);
        self.recompute_archived();
        added
    }

    /// Flips completion of the step at `index` and returns the new `done` flag.
    pub fn toggle_step(&mut self, index: usize, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let len = self.steps.len();
        let step = self
            .steps
            .get_mut(index)
            .ok_or(SessionError::StepOutOfRange { index, len })?;

        step.done = !step.done;
        step.done_at = step.done.then_some(now);
        let done = step.done;
        self.recompute_archived();
        Ok(done)
    }

    /// Sets or clears the operator override for one step. Text is kept verbatim.
    pub fn set_custom_date(
        &mut self,
        index: usize,
        custom_date: Option<String>,
    ) -> Result<(), SessionError> {
        let len = self.steps.len();
        let step = self
            .steps
            .get_mut(index)
            .ok_or(SessionError::StepOutOfRange { index, len })?;
        step.custom_date = custom_date
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(())
    }

    /// A session is archived once it has steps and all of them are done.
    pub fn recompute_archived(&mut self) {
        self.archived = !self.steps.is_empty() && self.steps.iter().all(|step| step.done);
    }

    pub fn invitation(&self, id: &InvitationId) -> Option<&JuryInvitation> {
        self.jurys.iter().find(|jury| &jury.id == id)
    }

    pub fn invitation_mut(&mut self, id: &InvitationId) -> Option<&mut JuryInvitation> {
        self.jurys.iter_mut().find(|jury| &jury.id == id)
    }

    /// Resolved and classified steps, ordered by deadline with unknown dates last.
    pub fn checklist(&self, catalog: &RuleCatalog, today: NaiveDate) -> Vec<StepView> {
        let mut views: Vec<StepView> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let rule = catalog.rule(&step.name);
                let deadline = resolve(step, rule, self);
                let status = classify(step, deadline, today);
                StepView {
                    index,
                    name: step.name.clone(),
                    rule: rule.map(|rule| rule.due.describe()),
                    deadline,
                    status,
                    status_label: status.label(),
                    done: step.done,
                    done_at: step.done_at,
                    custom_date: step.custom_date.clone(),
                }
            })
            .collect();
        views.sort_by_key(|view| view.deadline);
        views
    }

    pub fn report(&self, catalog: &RuleCatalog, today: NaiveDate) -> SessionReport {
        let checklist = self.checklist(catalog, today);
        let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
        for status in StepStatus::ordered() {
            by_status.insert(status_key(status), 0);
        }
        for view in &checklist {
            *by_status.entry(status_key(view.status)).or_insert(0) += 1;
        }

        let completed = checklist.iter().filter(|view| view.done).count();
        let late_steps = checklist
            .iter()
            .filter(|view| view.status == StepStatus::Late)
            .cloned()
            .collect();
        let next_deadline = checklist
            .iter()
            .filter(|view| !view.done)
            .filter_map(|view| view.deadline.date())
            .find(|date| *date >= today);

        SessionReport {
            session_id: self.id.clone(),
            total: checklist.len(),
            completed,
            archived: self.archived,
            by_status,
            late_steps,
            next_deadline,
        }
    }
}

fn status_key(status: StepStatus) -> &'static str {
    match status {
        StepStatus::NotApplicable => "n_a",
        StepStatus::Done => "done",
        StepStatus::Late => "late",
        StepStatus::OnTime => "on_time",
        StepStatus::Upcoming => "upcoming",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub deadline: Deadline,
    pub status: StepStatus,
    pub status_label: &'static str,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub custom_date: Option<String>,
}

/// Progress summary used by list views and the CLI report.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub total: usize,
    pub completed: usize,
    pub archived: bool,
    pub by_status: BTreeMap<&'static str, usize>,
    pub late_steps: Vec<StepView>,
    pub next_deadline: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::sessions::domain::{DueRule, StepRule};
    use chrono::TimeZone;

    fn two_rule_catalog() -> RuleCatalog {
        RuleCatalog::from_rules(vec![
            StepRule {
                name: "Declare the session to CNAPS",
                due: DueRule::before(Anchor::Start, 30),
            },
            StepRule {
                name: "Send convocations to trainees",
                due: DueRule::before(Anchor::Start, 20),
            },
        ])
    }

    fn session_with(catalog: &RuleCatalog) -> Session {
        Session::new(
            SessionId("s-1".to_string()),
            "APS March".to_string(),
            "aps".to_string(),
            Some("2025-03-01".to_string()),
            Some("2025-03-20".to_string()),
            catalog,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
    }

    #[test]
    fn new_session_seeds_catalog_steps_in_order() {
        let catalog = two_rule_catalog();
        let session = session_with(&catalog);
        let names: Vec<_> = session.steps.iter().map(|step| step.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Declare the session to CNAPS", "Send convocations to trainees"]
        );
        assert!(session.steps.iter().all(|step| !step.done));
        assert!(!session.archived);
    }

    #[test]
    fn sync_is_idempotent_and_preserves_existing_state() {
        let catalog = two_rule_catalog();
        let mut session = session_with(&catalog);
        session.toggle_step(1, now()).unwrap();
        session
            .set_custom_date(0, Some("2025-01-15".to_string()))
            .unwrap();
        session.steps.push(StepInstance::pending("Retired rule"));

        let mut extended = two_rule_catalog().rules().to_vec();
        extended.insert(
            0,
            StepRule {
                name: "Book the training room",
                due: DueRule::before(Anchor::Start, 45),
            },
        );
        let extended = RuleCatalog::from_rules(extended);

        assert_eq!(session.sync_steps(&extended), 1);
        let once = session.steps.clone();
        assert_eq!(session.sync_steps(&extended), 0);
        assert_eq!(session.steps, once);

        assert_eq!(session.steps[0].custom_date.as_deref(), Some("2025-01-15"));
        assert!(session.steps[1].done);
        assert_eq!(session.steps[2].name, "Retired rule");
        assert_eq!(session.steps[3].name, "Book the training room");
    }

    #[test]
    fn toggle_stamps_and_clears_done_at() {
        let catalog = two_rule_catalog();
        let mut session = session_with(&catalog);

        assert!(session.toggle_step(0, now()).unwrap());
        assert_eq!(session.steps[0].done_at, Some(now()));

        assert!(!session.toggle_step(0, now()).unwrap());
        assert_eq!(session.steps[0].done_at, None);

        assert_eq!(
            session.toggle_step(7, now()),
            Err(SessionError::StepOutOfRange { index: 7, len: 2 })
        );
    }

    #[test]
    fn archived_tracks_conjunction_of_done_flags() {
        let catalog = two_rule_catalog();
        let mut session = session_with(&catalog);

        session.toggle_step(0, now()).unwrap();
        assert!(!session.archived);
        session.toggle_step(1, now()).unwrap();
        assert!(session.archived);
        session.toggle_step(0, now()).unwrap();
        assert!(!session.archived);
        session.toggle_step(0, now()).unwrap();
        assert!(session.archived);

        let mut extended = catalog.rules().to_vec();
        extended.push(StepRule {
            name: "Archive the training file",
            due: DueRule::after(Anchor::Exam, 30),
        });
        session.sync_steps(&RuleCatalog::from_rules(extended));
        assert!(!session.archived, "new pending step reopens the session");
    }

    #[test]
    fn session_without_steps_is_not_archived() {
        let empty = RuleCatalog::from_rules(Vec::new());
        let mut session = session_with(&empty);
        assert!(session.steps.is_empty());
        assert!(!session.archived);
        session.recompute_archived();
        assert!(!session.archived);
    }

    #[test]
    fn checklist_sorts_by_deadline_with_unknown_last() {
        let catalog = two_rule_catalog();
        let mut session = session_with(&catalog);
        session.steps.insert(0, StepInstance::pending("Retired rule"));

        let checklist = session.checklist(&catalog, today());
        let names: Vec<_> = checklist.iter().map(|view| view.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Declare the session to CNAPS",
                "Send convocations to trainees",
                "Retired rule"
            ]
        );
        assert_eq!(checklist[1].status, StepStatus::Late);
        assert_eq!(checklist[2].status, StepStatus::NotApplicable);
        assert_eq!(checklist[2].index, 0);
    }

    #[test]
    fn report_counts_statuses_and_next_deadline() {
        let catalog = two_rule_catalog();
        let mut session = session_with(&catalog);
        session.toggle_step(0, now()).unwrap();
        session
            .set_custom_date(1, Some("11/02/2025".to_string()))
            .unwrap();

        let report = session.report(&catalog, today());
        assert_eq!(report.total, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.by_status["done"], 1);
        assert_eq!(report.by_status["upcoming"], 1);
        assert_eq!(report.by_status["late"], 0);
        assert!(report.late_steps.is_empty());
        assert_eq!(report.next_deadline, NaiveDate::from_ymd_opt(2025, 2, 11));
    }

    #[test]
    fn load_tolerates_missing_and_malformed_fields() {
        let raw = r#"{
            "id": "legacy",
            "formation": "aps",
            "startDate": "01/03/2025",
            "steps": [
                {"name": "Send convocations to trainees", "done": true, "doneAt": "not a date"},
                {}
            ]
        }"#;
        let session: Session = serde_json::from_str(raw).expect("lenient load");
        assert_eq!(session.steps.len(), 2);
        assert!(session.steps[0].done);
        assert!(session.steps[0].done_at.is_none());
        assert!(session.exam_date.is_none());
        assert!(session.jurys.is_empty());
    }
}
