use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};

use super::aggregate::{Session, StepInstance};
use super::domain::{Direction, DueRule, StepRule, StepStatus};
use crate::dates;

/// Resolved due date of a step. `Unknown` orders after every known date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Deadline {
    Known(NaiveDate),
    Unknown,
}

impl Deadline {
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            Deadline::Known(date) => Some(date),
            Deadline::Unknown => None,
        }
    }
}

impl Serialize for Deadline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.date().serialize(serializer)
    }
}

/// Due date of `step`: operator override, then the rule's fixed date, then the
/// anchor offset.
pub fn resolve(step: &StepInstance, rule: Option<&StepRule>, session: &Session) -> Deadline {
    if let Some(custom) = dates::parse_optional(step.custom_date.as_deref(), "custom_date") {
        return Deadline::Known(custom);
    }

    let Some(rule) = rule else {
        return Deadline::Unknown;
    };

    match rule.due {
        DueRule::Fixed(raw) => match dates::parse_date(raw) {
            Some(date) => Deadline::Known(date),
            None => {
                tracing::warn!(step = rule.name, value = raw, "catalog fixed date unparseable");
                Deadline::Unknown
            }
        },
        DueRule::Offset {
            anchor,
            direction,
            days,
        } => {
            let Some(anchor_date) = session.anchor_date(anchor) else {
                return Deadline::Unknown;
            };
            let offset = Duration::days(i64::from(days));
            let resolved = match direction {
                Direction::Before => anchor_date.checked_sub_signed(offset),
                Direction::After => anchor_date.checked_add_signed(offset),
            };
            resolved.map_or(Deadline::Unknown, Deadline::Known)
        }
    }
}

/// Status of `step` on `today`. Completion always wins over lateness.
pub fn classify(step: &StepInstance, deadline: Deadline, today: NaiveDate) -> StepStatus {
    match deadline {
        Deadline::Unknown => StepStatus::NotApplicable,
        Deadline::Known(due) => status_for_offset(step.done, (due - today).num_days()),
    }
}

pub(crate) fn status_for_offset(done: bool, diff_days: i64) -> StepStatus {
    if done {
        return StepStatus::Done;
    }
    match diff_days {
        d if d < 0 => StepStatus::Late,
        1 => StepStatus::Upcoming,
        _ => StepStatus::OnTime,
    }
}
