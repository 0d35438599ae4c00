use serde::{Deserialize, Serialize};

/// Training programmes offered by the academy. Each selects its own rule catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    Aps,
    A3p,
    Ssiap1,
    Dirigeant,
}

impl Formation {
    pub const fn ordered() -> [Self; 4] {
        [Self::Aps, Self::A3p, Self::Ssiap1, Self::Dirigeant]
    }

    /// Codes are stored as plain text on sessions and prospects so that an
    /// unknown code survives a load instead of rejecting the document.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "aps" => Some(Self::Aps),
            "a3p" => Some(Self::A3p),
            "ssiap1" | "ssiap" => Some(Self::Ssiap1),
            "dirigeant" => Some(Self::Dirigeant),
            _ => None,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Aps => "aps",
            Self::A3p => "a3p",
            Self::Ssiap1 => "ssiap1",
            Self::Dirigeant => "dirigeant",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Aps => "Agent de Prévention et de Sécurité",
            Self::A3p => "Agent de Protection Physique des Personnes",
            Self::Ssiap1 => "SSIAP 1 fire safety agent",
            Self::Dirigeant => "Private security company manager",
        }
    }

    /// Public list price in euros, before any follow-up discount.
    pub const fn base_price(self) -> u32 {
        match self {
            Self::Aps => 1650,
            Self::A3p => 3200,
            Self::Ssiap1 => 1490,
            Self::Dirigeant => 4900,
        }
    }
}

/// Session-level reference date a relative rule is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Start,
    Exam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Before,
    After,
}

/// How a step's due date is derived when no operator override is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueRule {
    /// Absolute calendar date, kept in its textual catalog form.
    Fixed(&'static str),
    Offset {
        anchor: Anchor,
        direction: Direction,
        days: u32,
    },
}

impl DueRule {
    pub const fn before(anchor: Anchor, days: u32) -> Self {
        Self::Offset {
            anchor,
            direction: Direction::Before,
            days,
        }
    }

    pub const fn after(anchor: Anchor, days: u32) -> Self {
        Self::Offset {
            anchor,
            direction: Direction::After,
            days,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DueRule::Fixed(date) => format!("fixed on {date}"),
            DueRule::Offset {
                anchor,
                direction,
                days,
            } => {
                let anchor = match anchor {
                    Anchor::Start => "training start",
                    Anchor::Exam => "exam",
                };
                let direction = match direction {
                    Direction::Before => "before",
                    Direction::After => "after",
                };
                format!("{days} days {direction} {anchor}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRule {
    pub name: &'static str,
    pub due: DueRule,
}

/// Outcome of classifying one step against the current calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    #[serde(rename = "n_a")]
    NotApplicable,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "late")]
    Late,
    #[serde(rename = "on_time")]
    OnTime,
    #[serde(rename = "upcoming")]
    Upcoming,
}

impl StepStatus {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Late,
            Self::Upcoming,
            Self::OnTime,
            Self::Done,
            Self::NotApplicable,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NotApplicable => "N/A",
            Self::Done => "Done",
            Self::Late => "Late",
            Self::OnTime => "On time",
            Self::Upcoming => "Due tomorrow",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("step index {index} out of range (session has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },
    #[error("invitation {0} not found")]
    InvitationNotFound(String),
}
