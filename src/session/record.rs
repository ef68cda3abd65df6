//! Per-key session state and the messages derived from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::AiNote;
use crate::form::{is_form_complete, validate_form, AccidentReportForm};

/// Mutable state of one live session. Always accessed under the owning
/// handle's mutex.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub form: AccidentReportForm,
    pub validation_errors: BTreeMap<String, String>,
    pub ai_notes: Vec<AiNote>,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
    pub analysis_updated_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new() -> Self {
        let form = AccidentReportForm::default();
        let validation_errors = validate_form(&form);
        Self {
            form,
            validation_errors,
            ai_notes: Vec::new(),
            created_at: Utc::now(),
            last_updated: None,
            analysis_updated_at: None,
        }
    }

    /// Revalidate after the form changed.
    pub fn refresh_validation(&mut self) {
        self.validation_errors = validate_form(&self.form);
    }

    pub fn snapshot(&self, key: &str) -> SessionSnapshot {
        SessionSnapshot {
            key: key.to_string(),
            form_data: self.form.clone(),
            validation_errors: self.validation_errors.clone(),
            is_complete: is_form_complete(&self.form),
            ai_notes: self.ai_notes.clone(),
            created_at: self.created_at,
            last_updated: self.last_updated,
            analysis_updated_at: self.analysis_updated_at,
        }
    }

    /// The message broadcast to stream subscribers after a commit.
    pub fn envelope(&self, key: &str) -> UpdateEnvelope {
        UpdateEnvelope {
            kind: "update",
            key: key.to_string(),
            form_data: self.form.clone(),
            validation_errors: self.validation_errors.clone(),
            ai_notes: self.ai_notes.clone(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a session, returned by read paths and handed to
/// late stream joiners before any live update.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub key: String,
    pub form_data: AccidentReportForm,
    pub validation_errors: BTreeMap<String, String>,
    pub is_complete: bool,
    pub ai_notes: Vec<AiNote>,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
    pub analysis_updated_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Envelope form of this snapshot, used as the initial stream message.
    pub fn into_envelope(self) -> UpdateEnvelope {
        UpdateEnvelope {
            kind: "update",
            key: self.key,
            form_data: self.form_data,
            validation_errors: self.validation_errors,
            ai_notes: self.ai_notes,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast message carrying the full post-commit state.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub key: String,
    pub form_data: AccidentReportForm,
    pub validation_errors: BTreeMap<String, String>,
    pub ai_notes: Vec<AiNote>,
    pub timestamp: DateTime<Utc>,
}

/// Listing entry for the capacity-free session index.
#[derive(Debug, Clone, Serialize)]
pub struct SessionListEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}
