//! Request/Response types for the HTTP server.
//!
//! These types define the wire format for all HTTP API endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analysis::{AiNote, DocumentOpinion};
use crate::form::AccidentReportForm;
use crate::session::{SessionListEntry, SessionSnapshot};
use crate::store::{ApplicationRecord, AttachmentMetadata};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Server status (always "ok" when healthy)
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Agent webhook body. Updates arrive either structured or as a JSON
/// string with dot-notation keys (`serialized_form_data`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookPayload {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub form_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub serialized_form_data: Option<String>,
}

/// Query parameters accepted by the webhook endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookQuery {
    #[serde(rename = "callId")]
    pub call_id: Option<String>,
}

/// Webhook acknowledgement carrying the converged state.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub key: String,
    pub form_data: AccidentReportForm,
    pub validation_errors: std::collections::BTreeMap<String, String>,
    pub is_complete: bool,
}

impl WebhookResponse {
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            success: true,
            key: snapshot.key,
            form_data: snapshot.form_data,
            validation_errors: snapshot.validation_errors,
            is_complete: snapshot.is_complete,
        }
    }
}

/// Manual wizard sync body.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    pub form_data: AccidentReportForm,
    /// Re-run analysis after the sync
    #[serde(default)]
    pub analyse: bool,
}

/// Result of a triggered analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyseResponse {
    pub key: String,
    pub ai_notes: Vec<AiNote>,
    pub analysis_updated_at: Option<DateTime<Utc>>,
}

/// Response listing all live sessions.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionListEntry>,
    pub count: usize,
}

/// Body for creating an application record. Attachments supplied inline
/// are validated before the record exists, so a bad one creates nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplicationRequest {
    pub form_data: AccidentReportForm,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ai_suggestion: Option<f64>,
    #[serde(default)]
    pub ai_comments: Option<Value>,
    #[serde(default)]
    pub attachments: Vec<CreateAttachmentRequest>,
}

/// Body for a partial application update; only supplied fields change.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateApplicationRequest {
    #[serde(default)]
    pub form_data: Option<AccidentReportForm>,
    #[serde(default)]
    pub ai_suggestion: Option<f64>,
    #[serde(default)]
    pub ai_comments: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Query parameters for the application list endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListApplicationsQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub pesel: Option<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One row of the application listing.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pesel: String,
    pub status: Option<String>,
    pub ai_suggestion: Option<f64>,
    pub summary: String,
    pub attachment_count: usize,
}

impl ApplicationListItem {
    pub fn from_record(record: &ApplicationRecord) -> Self {
        Self {
            id: record.id.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            pesel: record.pesel.clone(),
            status: record.status.clone(),
            ai_suggestion: record.ai_suggestion,
            summary: summarize(record),
            attachment_count: record.attachment_ids.len(),
        }
    }
}

/// One-line listing summary: place of the accident plus a clipped injury
/// description, marked with "..." when the clip drops anything.
fn summarize(record: &ApplicationRecord) -> String {
    let miejsce = record.form_data.szczegoly.miejsce.as_str();
    let description = &record.form_data.szczegoly.opis_urazow;
    let mut opis: String = description.chars().take(50).collect();
    if description.chars().count() > 50 {
        opis.push_str("...");
    }
    match (miejsce.is_empty(), opis.is_empty()) {
        (true, true) => String::new(),
        (false, true) => miejsce.to_string(),
        (true, false) => opis,
        (false, false) => format!("{miejsce} - {opis}"),
    }
}

/// Paginated application listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListApplicationsResponse {
    pub items: Vec<ApplicationListItem>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Body for uploading an attachment, base64-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttachmentRequest {
    pub title: String,
    pub mime_type: String,
    pub data: String,
}

/// Upload acknowledgement with the refreshed attachment list.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAttachmentResponse {
    pub attachment: AttachmentMetadata,
    pub attachments: Vec<AttachmentMetadata>,
}

/// One document for the stateless grading endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentFileInput {
    pub filename: String,
    pub mime_type: String,
    /// base64 encoded
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyseDocumentsRequest {
    pub files: Vec<DocumentFileInput>,
}

/// Grading verdict with the mapped category code.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyseDocumentsResponse {
    pub grade: String,
    pub grade_code: &'static str,
    pub justification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circumstances: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl AnalyseDocumentsResponse {
    pub fn from_opinion(opinion: DocumentOpinion) -> Self {
        let code = crate::analysis::grade_code(&opinion.grade);
        Self {
            grade: opinion.grade,
            grade_code: code,
            justification: opinion.justification,
            circumstances: opinion.circumstances,
            anomalies: opinion.anomalies,
            raw: opinion.raw,
        }
    }
}
