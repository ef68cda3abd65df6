//! AI analysis collaborators.
//!
//! Two seams: [`FormAnalyzer`] reviews a live form and produces advisory
//! notes, [`DocumentAnalyzer`] grades uploaded accident documents without
//! touching any session. Both run outside every lock; callers treat a
//! failing form analysis as "no notes", never as a hard error.

pub mod gemini;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::form::AccidentReportForm;

pub use gemini::{GeminiAnalyzer, NoopAnalyzer};

/// Advisory note attached to a session by the form analyzer. Messages are
/// Polish, formal tone, and never contain personal data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiNote {
    pub section: String,
    pub message: String,
    pub severity: NoteSeverity,
    pub fields: Vec<String>,
    pub reason: NoteReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteReason {
    Missing,
    Insufficient,
    Inconsistent,
}

/// Reviews form completeness and consistency.
#[async_trait]
pub trait FormAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        form: &AccidentReportForm,
        validation_errors: &BTreeMap<String, String>,
    ) -> Result<Vec<AiNote>>;
}

/// One uploaded document for the stateless grading surface.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Grader verdict over a set of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOpinion {
    pub grade: String,
    pub justification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circumstances: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Grades accident documents in memory, no persistence.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyse_documents(&self, files: &[DocumentInput]) -> Result<DocumentOpinion>;
}

/// Maps a free-text grade to one of `yes`, `no`, `uncertain`,
/// `insufficient`. Full verdict phrases are matched before bare words so
/// that e.g. "nie, nie jest to wypadek" is not swallowed by the bare
/// "tak"/"nie" checks.
pub fn grade_code(grade: &str) -> &'static str {
    let grade = grade.to_lowercase();
    if grade.contains("tak, jest to wypadek") {
        "yes"
    } else if grade.contains("nie, nie jest to wypadek") {
        "no"
    } else if grade.contains("nie mam wystarczających informacji") || grade.contains("insufficient")
    {
        "insufficient"
    } else if grade.contains("wątpliwy") || grade.contains("nie mam 100% pewności") {
        "uncertain"
    } else if grade.contains("tak") {
        "yes"
    } else if grade.contains("nie") {
        "no"
    } else {
        "uncertain"
    }
}
