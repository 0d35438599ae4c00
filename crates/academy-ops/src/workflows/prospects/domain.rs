use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::dates::{self, lenient_timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProspectId(pub String);

impl ProspectId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for ProspectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lead who asked about a formation and may receive one follow-up offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    #[serde(default)]
    pub id: ProspectId,
    #[serde(default)]
    pub formation: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Personal training account balance. The offer never goes below it plus the margin.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub cpf: f64,
    #[serde(default)]
    pub training_start: Option<String>,
    #[serde(default)]
    pub sent: bool,
    #[serde(default, with = "lenient_timestamp")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub proposed_price: Option<u32>,
    #[serde(default)]
    pub proposed_discount: Option<u32>,
}

impl Prospect {
    pub fn training_start_date(&self) -> Option<NaiveDate> {
        dates::parse_optional(self.training_start.as_deref(), "training_start")
    }

    pub fn mark_attempted(&mut self, now: DateTime<Utc>) {
        self.last_attempt_at = Some(now);
    }

    /// Records a successful send. A prospect is only ever marked sent once.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        if self.sent {
            return;
        }
        self.sent = true;
        self.sent_at = Some(now);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }
}

/// Payload accepted when registering a prospect.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProspect {
    pub formation: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpf: f64,
    #[serde(default)]
    pub training_start: Option<String>,
}

/// Accepts a number, a numeric string or null. Anything else loads as zero.
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let amount = match &raw {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().replace(',', ".").parse::<f64>().ok(),
        serde_json::Value::Null => Some(0.0),
        _ => None,
    };
    match amount {
        Some(value) if value.is_finite() => Ok(value),
        _ => {
            tracing::warn!(value = %raw, "ignoring unparseable cpf amount");
            Ok(0.0)
        }
    }
}
