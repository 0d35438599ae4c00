use super::domain::{Anchor, DueRule, Formation, StepRule};

/// Ordered step rules for one formation.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    formation: Option<Formation>,
    rules: Vec<StepRule>,
}

impl RuleCatalog {
    /// Catalog for a stored formation code. Unknown codes yield an empty catalog,
    /// which leaves every step of such a session unresolvable.
    pub fn for_code(code: &str) -> Self {
        match Formation::from_code(code) {
            Some(formation) => Self::for_formation(formation),
            None => {
                tracing::warn!(formation = code, "no rule catalog for formation");
                Self {
                    formation: None,
                    rules: Vec::new(),
                }
            }
        }
    }

    pub fn for_formation(formation: Formation) -> Self {
        let rules = match formation {
            Formation::Aps => aps_rules(),
            Formation::A3p => a3p_rules(),
            Formation::Ssiap1 => ssiap1_rules(),
            Formation::Dirigeant => dirigeant_rules(),
        };
        Self {
            formation: Some(formation),
            rules,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_rules(rules: Vec<StepRule>) -> Self {
        Self {
            formation: None,
            rules,
        }
    }

    pub fn formation(&self) -> Option<Formation> {
        self.formation
    }

    pub fn rules(&self) -> &[StepRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&StepRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn common_opening_rules() -> Vec<StepRule> {
    vec![
        StepRule {
            name: "Declare the session to CNAPS",
            due: DueRule::before(Anchor::Start, 30),
        },
        StepRule {
            name: "Send convocations to trainees",
            due: DueRule::before(Anchor::Start, 20),
        },
        StepRule {
            name: "Verify trainee prior authorisations",
            due: DueRule::before(Anchor::Start, 10),
        },
        StepRule {
            name: "Sign attendance sheets for day one",
            due: DueRule::after(Anchor::Start, 0),
        },
    ]
}

fn common_closing_rules() -> Vec<StepRule> {
    vec![
        StepRule {
            name: "Issue attendance certificates",
            due: DueRule::after(Anchor::Exam, 2),
        },
        StepRule {
            name: "Upload exam results",
            due: DueRule::after(Anchor::Exam, 7),
        },
        StepRule {
            name: "Collect satisfaction surveys",
            due: DueRule::after(Anchor::Exam, 14),
        },
        StepRule {
            name: "Archive the training file",
            due: DueRule::after(Anchor::Exam, 30),
        },
    ]
}

fn aps_rules() -> Vec<StepRule> {
    let mut rules = common_opening_rules();
    rules.extend([
        StepRule {
            name: "Book the SST first-aid module trainer",
            due: DueRule::before(Anchor::Start, 15),
        },
        StepRule {
            name: "Register candidates with the certifier",
            due: DueRule::before(Anchor::Exam, 21),
        },
        StepRule {
            name: "Invite jury members",
            due: DueRule::before(Anchor::Exam, 14),
        },
        StepRule {
            name: "Send exam documents to the certifier",
            due: DueRule::before(Anchor::Exam, 7),
        },
    ]);
    rules.extend(common_closing_rules());
    rules
}

fn a3p_rules() -> Vec<StepRule> {
    let mut rules = common_opening_rules();
    rules.extend([
        StepRule {
            name: "Confirm driving track reservation",
            due: DueRule::before(Anchor::Start, 21),
        },
        StepRule {
            name: "Check practical exercise equipment",
            due: DueRule::before(Anchor::Start, 5),
        },
        StepRule {
            name: "Invite jury members",
            due: DueRule::before(Anchor::Exam, 21),
        },
        StepRule {
            name: "Send exam documents to the certifier",
            due: DueRule::before(Anchor::Exam, 10),
        },
    ]);
    rules.extend(common_closing_rules());
    rules
}

fn ssiap1_rules() -> Vec<StepRule> {
    let mut rules = common_opening_rules();
    rules.extend([
        StepRule {
            name: "Reserve the fire training ground",
            due: DueRule::before(Anchor::Start, 25),
        },
        StepRule {
            name: "Notify the SDIS of the exam date",
            due: DueRule::before(Anchor::Exam, 30),
        },
        StepRule {
            name: "Invite jury members",
            due: DueRule::before(Anchor::Exam, 14),
        },
        StepRule {
            name: "File the annual SSIAP activity return",
            due: DueRule::Fixed("2025-12-31"),
        },
    ]);
    rules.extend(common_closing_rules());
    rules
}

fn dirigeant_rules() -> Vec<StepRule> {
    let mut rules = common_opening_rules();
    rules.extend([
        StepRule {
            name: "Collect company registration extracts",
            due: DueRule::before(Anchor::Start, 7),
        },
        StepRule {
            name: "Invite jury members",
            due: DueRule::before(Anchor::Exam, 14),
        },
        StepRule {
            name: "Submit Qualiopi audit evidence",
            due: DueRule::Fixed("30/06/2026"),
        },
    ]);
    rules.extend(common_closing_rules());
    rules
}
