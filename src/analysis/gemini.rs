//! Gemini-backed implementations of the analysis seams.
//!
//! Requests go straight to the `generateContent` REST endpoint with a JSON
//! response MIME type and low temperature. Model output is still salvaged
//! from markdown fences before parsing, since constrained decoding is not
//! guaranteed across model versions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{FormsyncError, Result};
use crate::form::AccidentReportForm;

use super::{AiNote, DocumentAnalyzer, DocumentInput, DocumentOpinion, FormAnalyzer};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const FORM_ANALYSIS_INSTRUCTION: &str = "\
Jesteś asystentem analizującym kompletność, spójność i jakość formularza \
zgłoszenia wypadku przy pracy. Wygeneruj listę notatek wskazujących braki, \
niespójności oraz pokrycie 4 przesłanek wypadku przy pracy (nagłość, \
przyczyna zewnętrzna, uraz, związek z pracą). Notatki po polsku, formalnym \
tonem, bez danych osobowych. Każda notatka: section, message, severity \
(warning|critical), fields (ścieżki dot-notation), reason \
(missing|insufficient|inconsistent), opcjonalnie suggested_action. Jeśli \
dane są kompletne i spójne, zwróć pustą listę notes. \
Brak szczegoly.opis_okolicznosci przy braku świadków wymaga co najmniej \
jednej notatki severity=critical. \
Zwróć JSON: {\"notes\": [...]}";

const DOCUMENT_GRADING_INSTRUCTION: &str = "\
Jesteś ekspertem oceniającym na podstawie załączonych dokumentów, czy \
zdarzenie kwalifikuje się jako wypadek przy pracy. Zwróć JSON z polami: \
grade (jedno z: \"Tak, jest to wypadek przy pracy\", \"Nie, nie jest to \
wypadek przy pracy\", \"Przypadek wątpliwy\", \"Nie mam wystarczających \
informacji, aby ocenić, czy jest to wypadek przy pracy\"), justification, \
circumstances, anomalies. Odpowiedź po polsku, formalnym tonem.";

/// Gemini REST client used for both analysis seams.
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One `generateContent` round-trip returning the first candidate's text.
    async fn generate(&self, instruction: &str, parts: Vec<Value>) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request_body = json!({
            "system_instruction": { "parts": [{ "text": instruction }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": 0.3,
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| FormsyncError::Collaborator(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FormsyncError::Collaborator(format!(
                "Gemini API error ({status}): {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FormsyncError::Collaborator(format!("invalid response body: {e}")))?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|text| text.to_string())
            .ok_or_else(|| {
                FormsyncError::Collaborator("response carried no candidate text".to_string())
            })
    }
}

#[derive(Deserialize)]
struct NotesEnvelope {
    #[serde(default)]
    notes: Vec<AiNote>,
}

#[async_trait]
impl FormAnalyzer for GeminiAnalyzer {
    async fn analyze(
        &self,
        form: &AccidentReportForm,
        validation_errors: &BTreeMap<String, String>,
    ) -> Result<Vec<AiNote>> {
        let payload = redacted_analysis_payload(form, validation_errors);
        let prompt = format!(
            "Przeanalizuj poniższy formularz zgłoszenia wypadku przy pracy i \
             wygeneruj listę notatek wskazujących braki, niespójności i \
             sugestie uzupełnienia.\n\nDane formularza:\n{}",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );

        let text = self
            .generate(FORM_ANALYSIS_INSTRUCTION, vec![json!({ "text": prompt })])
            .await?;

        let envelope: NotesEnvelope = serde_json::from_str(extract_json(&text))
            .map_err(|e| FormsyncError::Collaborator(format!("unparseable notes: {e}")))?;
        debug!(notes = envelope.notes.len(), "form analysis completed");
        Ok(envelope.notes)
    }
}

#[async_trait]
impl DocumentAnalyzer for GeminiAnalyzer {
    async fn analyse_documents(&self, files: &[DocumentInput]) -> Result<DocumentOpinion> {
        let mut parts = vec![json!({
            "text": "Oceń na podstawie załączonych dokumentów, czy zdarzenie \
                     kwalifikuje się jako wypadek przy pracy."
        })];
        for file in files {
            parts.push(json!({
                "inline_data": {
                    "mime_type": file.mime_type,
                    "data": BASE64.encode(&file.data)
                }
            }));
        }

        let text = self.generate(DOCUMENT_GRADING_INSTRUCTION, parts).await?;
        let raw: Value = serde_json::from_str(extract_json(&text))
            .map_err(|e| FormsyncError::Collaborator(format!("unparseable verdict: {e}")))?;

        let grade = raw["grade"]
            .as_str()
            .unwrap_or(
                "Nie mam wystarczających informacji, aby ocenić, czy jest to wypadek przy pracy",
            )
            .to_string();

        Ok(DocumentOpinion {
            grade,
            justification: raw["justification"].as_str().unwrap_or_default().to_string(),
            circumstances: raw["circumstances"].as_str().map(str::to_string),
            anomalies: raw["anomalies"].as_str().map(str::to_string),
            raw: Some(raw),
        })
    }
}

/// Analyzer used when no API key is configured. Form analysis degrades to
/// an empty note list; document grading has no fallback and reports the
/// missing collaborator.
pub struct NoopAnalyzer;

#[async_trait]
impl FormAnalyzer for NoopAnalyzer {
    async fn analyze(
        &self,
        _form: &AccidentReportForm,
        _validation_errors: &BTreeMap<String, String>,
    ) -> Result<Vec<AiNote>> {
        warn!("form analysis requested but no analysis backend is configured");
        Ok(Vec::new())
    }
}

#[async_trait]
impl DocumentAnalyzer for NoopAnalyzer {
    async fn analyse_documents(&self, _files: &[DocumentInput]) -> Result<DocumentOpinion> {
        Err(FormsyncError::Collaborator(
            "analysis backend not configured".to_string(),
        ))
    }
}

/// Analysis payload with personal data reduced to presence flags. Event
/// details are passed through verbatim, witness entries collapse to counts.
fn redacted_analysis_payload(
    form: &AccidentReportForm,
    validation_errors: &BTreeMap<String, String>,
) -> Value {
    json!({
        "szczegoly": form.szczegoly,
        "poszkodowany": {
            "imie_wypelnione": !form.poszkodowany.imie.is_empty(),
            "nazwisko_wypelnione": !form.poszkodowany.nazwisko.is_empty(),
            "pesel_wypelnione": !form.poszkodowany.pesel.is_empty(),
            "data_urodzenia_wypelnione": !form.poszkodowany.data_urodzenia.is_empty(),
            "telefon_wypelnione": !form.poszkodowany.telefon.is_empty(),
        },
        "swiadkowie": {
            "liczba": form.swiadkowie.len(),
            "wszyscy_wypelnieni": !form.swiadkowie.is_empty()
                && form
                    .swiadkowie
                    .iter()
                    .all(|w| !w.imie.is_empty() && !w.nazwisko.is_empty()),
        },
        "validation_errors": validation_errors,
    })
}

/// Extract JSON from model output that may be wrapped in markdown fences.
fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        let content_start = response[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    response.trim()
}
