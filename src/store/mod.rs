//! In-memory application store.
//!
//! One `Mutex` guards the application map, the attachment map, and the PESEL
//! index together, so no caller can ever observe the index out of sync with
//! the records. Critical sections are pure in-memory mutation; nothing
//! external runs while the lock is held.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::AccidentReportForm;

/// A stored application. `seq` is an insertion counter used only as a
/// stable tie-breaker when sorting by creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pesel: String,
    pub form_data: AccidentReportForm,
    pub ai_suggestion: Option<f64>,
    pub ai_comments: Option<serde_json::Value>,
    pub status: Option<String>,
    pub attachment_ids: Vec<String>,
    #[serde(skip)]
    seq: u64,
}

/// An attachment blob owned by exactly one application.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata without the payload, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

impl AttachmentRecord {
    pub fn metadata(&self) -> AttachmentMetadata {
        AttachmentMetadata {
            id: self.id.clone(),
            title: self.title.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.data.len(),
            created_at: self.created_at,
        }
    }
}

/// Filters for [`ApplicationStore::list`]. All filters exclude; `None`
/// means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub pesel: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// A partial update: only supplied fields are written.
#[derive(Debug, Clone, Default)]
pub struct ApplicationPatch {
    pub form_data: Option<AccidentReportForm>,
    pub ai_suggestion: Option<f64>,
    pub ai_comments: Option<serde_json::Value>,
    pub status: Option<String>,
}

#[derive(Default)]
struct StoreInner {
    applications: HashMap<String, ApplicationRecord>,
    attachments: HashMap<String, AttachmentRecord>,
    // pesel -> application ids; kept strictly consistent with `applications`
    pesel_index: HashMap<String, Vec<String>>,
    next_seq: u64,
}

impl StoreInner {
    fn index_insert(&mut self, pesel: &str, app_id: &str) {
        self.pesel_index
            .entry(pesel.to_string())
            .or_default()
            .push(app_id.to_string());
    }

    fn index_remove(&mut self, pesel: &str, app_id: &str) {
        if let Some(ids) = self.pesel_index.get_mut(pesel) {
            ids.retain(|id| id != app_id);
            if ids.is_empty() {
                self.pesel_index.remove(pesel);
            }
        }
    }
}

/// Thread-safe in-memory store for applications and their attachments.
pub struct ApplicationStore {
    inner: Mutex<StoreInner>,
}

impl ApplicationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Create a new application and index it by the injured party's PESEL.
    pub fn create(
        &self,
        form_data: AccidentReportForm,
        status: Option<String>,
        ai_suggestion: Option<f64>,
        ai_comments: Option<serde_json::Value>,
    ) -> ApplicationRecord {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let record = ApplicationRecord {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            pesel: form_data.poszkodowany.pesel.clone(),
            form_data,
            ai_suggestion,
            ai_comments,
            status,
            attachment_ids: Vec::new(),
            seq: inner.next_seq,
        };
        inner.next_seq += 1;
        let (pesel, id) = (record.pesel.clone(), record.id.clone());
        inner.index_insert(&pesel, &id);
        inner.applications.insert(id, record.clone());
        record
    }

    pub fn get(&self, id: &str) -> Option<ApplicationRecord> {
        self.inner.lock().applications.get(id).cloned()
    }

    /// List applications with filters and 1-based pagination. Returns the
    /// page of records plus the total filtered count.
    pub fn list(
        &self,
        page: usize,
        page_size: usize,
        filter: &ListFilter,
    ) -> (Vec<ApplicationRecord>, usize) {
        let inner = self.inner.lock();

        // Resolve candidates through the index when filtering by PESEL,
        // otherwise scan everything.
        let candidates: Vec<&ApplicationRecord> = match &filter.pesel {
            Some(pesel) => inner
                .pesel_index
                .get(pesel)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| inner.applications.get(id))
                        .collect()
                })
                .unwrap_or_default(),
            None => inner.applications.values().collect(),
        };

        let mut filtered: Vec<&ApplicationRecord> = candidates
            .into_iter()
            .filter(|app| {
                if let Some(from) = filter.date_from {
                    if app.created_at < from {
                        return false;
                    }
                }
                if let Some(to) = filter.date_to {
                    if app.created_at > to {
                        return false;
                    }
                }
                if let Some(status) = &filter.status {
                    if app.status.as_deref() != Some(status.as_str()) {
                        return false;
                    }
                }
                true
            })
            .collect();

        // Newest first; insertion order breaks created_at ties stably.
        filtered.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let total = filtered.len();
        let start = (page.saturating_sub(1)) * page_size;
        let items = filtered
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        (items, total)
    }

    /// Apply a partial update. A form replacement that changes the PESEL
    /// moves the id between index entries in the same critical section.
    pub fn update(&self, id: &str, patch: ApplicationPatch) -> Option<ApplicationRecord> {
        let mut inner = self.inner.lock();
        if !inner.applications.contains_key(id) {
            return None;
        }

        if let Some(form_data) = patch.form_data {
            let new_pesel = form_data.poszkodowany.pesel.clone();
            let old_pesel = inner.applications[id].pesel.clone();
            if old_pesel != new_pesel {
                inner.index_remove(&old_pesel, id);
                inner.index_insert(&new_pesel, id);
            }
            if let Some(app) = inner.applications.get_mut(id) {
                app.form_data = form_data;
                app.pesel = new_pesel;
            }
        }

        let app = inner.applications.get_mut(id)?;
        if let Some(suggestion) = patch.ai_suggestion {
            app.ai_suggestion = Some(suggestion);
        }
        if let Some(comments) = patch.ai_comments {
            app.ai_comments = Some(comments);
        }
        if let Some(status) = patch.status {
            app.status = Some(status);
        }
        app.updated_at = Utc::now();

        Some(app.clone())
    }

    /// Hard delete: removes the application, every attachment it owns, and
    /// its index entry. Returns false for an unknown id.
    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(app) = inner.applications.remove(id) else {
            return false;
        };
        for att_id in &app.attachment_ids {
            inner.attachments.remove(att_id);
        }
        inner.index_remove(&app.pesel, id);
        true
    }

    /// Attach a decoded blob to an application. Returns `None` when the
    /// application does not exist.
    pub fn create_attachment(
        &self,
        app_id: &str,
        title: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Option<AttachmentMetadata> {
        let mut inner = self.inner.lock();
        if !inner.applications.contains_key(app_id) {
            return None;
        }

        let attachment = AttachmentRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            mime_type: mime_type.to_string(),
            data,
            created_at: Utc::now(),
        };
        let metadata = attachment.metadata();
        inner
            .attachments
            .insert(attachment.id.clone(), attachment);

        let app = inner.applications.get_mut(app_id)?;
        app.attachment_ids.push(metadata.id.clone());
        app.updated_at = Utc::now();

        Some(metadata)
    }

    /// Fetch an attachment, verifying it belongs to the given application.
    pub fn get_attachment(&self, app_id: &str, att_id: &str) -> Option<AttachmentRecord> {
        let inner = self.inner.lock();
        let app = inner.applications.get(app_id)?;
        if !app.attachment_ids.iter().any(|id| id == att_id) {
            return None;
        }
        inner.attachments.get(att_id).cloned()
    }

    /// Metadata for every attachment of an application, in upload order.
    /// Returns `None` when the application does not exist.
    pub fn list_attachments(&self, app_id: &str) -> Option<Vec<AttachmentMetadata>> {
        let inner = self.inner.lock();
        let app = inner.applications.get(app_id)?;
        Some(
            app.attachment_ids
                .iter()
                .filter_map(|id| inner.attachments.get(id))
                .map(AttachmentRecord::metadata)
                .collect(),
        )
    }

    /// Detach and delete a single attachment. Returns false when either id
    /// is unknown or the attachment belongs to a different application.
    pub fn delete_attachment(&self, app_id: &str, att_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(app) = inner.applications.get_mut(app_id) else {
            return false;
        };
        let before = app.attachment_ids.len();
        app.attachment_ids.retain(|id| id != att_id);
        if app.attachment_ids.len() == before {
            return false;
        }
        app.updated_at = Utc::now();
        inner.attachments.remove(att_id).is_some()
    }

    /// Verify the index invariant: an id appears under key K iff the record
    /// exists and its PESEL equals K.
    #[cfg(test)]
    fn index_is_consistent(&self) -> bool {
        let inner = self.inner.lock();
        let mut expected: HashMap<String, Vec<String>> = HashMap::new();
        for app in inner.applications.values() {
            expected
                .entry(app.pesel.clone())
                .or_default()
                .push(app.id.clone());
        }
        if expected.len() != inner.pesel_index.len() {
            return false;
        }
        expected.iter().all(|(pesel, ids)| {
            inner.pesel_index.get(pesel).is_some_and(|indexed| {
                let mut a = ids.clone();
                let mut b = indexed.clone();
                a.sort();
                b.sort();
                a == b
            })
        })
    }
}

impl Default for ApplicationStore {
    fn default() -> Self {
        Self::new()
    }
}
