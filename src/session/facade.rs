//! Session façade: the single entry point for all keyed form-state
//! mutations and reads.
//!
//! One `SessionHandle` per key, created lazily on first touch. Merge,
//! validation, commit, and publish all happen inside the handle's mutex
//! so subscribers observe updates in exactly commit order. The analysis
//! collaborator is the one slow dependency and is always called with no
//! lock held.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::analysis::FormAnalyzer;
use crate::error::{FormsyncError, Result};
use crate::form::{apply_updates, AccidentReportForm};

use super::hub::{BroadcastHub, Subscription};
use super::record::{SessionListEntry, SessionRecord, SessionSnapshot};

pub struct SessionHandle {
    record: Mutex<SessionRecord>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            record: Mutex::new(SessionRecord::new()),
        }
    }
}

pub struct SessionService {
    sessions: DashMap<String, Arc<SessionHandle>>,
    hub: Arc<BroadcastHub>,
    analyzer: Arc<dyn FormAnalyzer>,
}

impl SessionService {
    pub fn new(hub: Arc<BroadcastHub>, analyzer: Arc<dyn FormAnalyzer>) -> Self {
        Self {
            sessions: DashMap::new(),
            hub,
            analyzer,
        }
    }

    fn ensure(&self, key: &str) -> Arc<SessionHandle> {
        self.sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                info!(key, "session created");
                Arc::new(SessionHandle::new())
            })
            .clone()
    }

    /// Current state of the session, creating it on first touch.
    pub fn snapshot(&self, key: &str) -> SessionSnapshot {
        let handle = self.ensure(key);
        let record = handle.record.lock();
        record.snapshot(key)
    }

    /// Merge a partial update into the session document. The merge engine
    /// rejects atomically; on success validation errors are recomputed,
    /// analysis notes go stale and are cleared, and the new state is
    /// published before the lock is released.
    pub fn apply_updates(
        &self,
        key: &str,
        updates: &Map<String, Value>,
    ) -> Result<SessionSnapshot> {
        let handle = self.ensure(key);
        let mut record = handle.record.lock();

        let merged = apply_updates(&record.form, updates)?;
        record.form = merged;
        record.refresh_validation();
        record.ai_notes.clear();
        record.analysis_updated_at = None;
        record.last_updated = Some(chrono::Utc::now());

        self.hub.publish(key, &record.envelope(key));
        Ok(record.snapshot(key))
    }

    /// Stamp activity and republish the current state without changing the
    /// document. The webhook path calls this when a delivery carries no
    /// usable updates, so streams still observe the contact.
    pub fn touch(&self, key: &str) -> SessionSnapshot {
        let handle = self.ensure(key);
        let mut record = handle.record.lock();
        record.last_updated = Some(chrono::Utc::now());
        self.hub.publish(key, &record.envelope(key));
        record.snapshot(key)
    }

    /// Replace the whole document, as the wizard UI does on manual sync.
    /// Existing analysis notes are kept; pass `analyse` to refresh them
    /// after the commit.
    pub async fn replace(
        &self,
        key: &str,
        form: AccidentReportForm,
        analyse: bool,
    ) -> Result<SessionSnapshot> {
        let handle = self.ensure(key);
        let snapshot = {
            let mut record = handle.record.lock();
            record.form = form;
            record.refresh_validation();
            record.last_updated = Some(chrono::Utc::now());
            self.hub.publish(key, &record.envelope(key));
            record.snapshot(key)
        };

        if analyse {
            return self.analyse(key).await;
        }
        Ok(snapshot)
    }

    /// Run the analysis collaborator over the current document and commit
    /// its notes. Unknown keys are an error here: analysis on a session
    /// nobody ever wrote to is always a caller mistake.
    ///
    /// The collaborator runs unlocked; its notes are committed to whatever
    /// the document is once the lock is re-acquired. A failing collaborator
    /// degrades to an empty note list.
    pub async fn analyse(&self, key: &str) -> Result<SessionSnapshot> {
        let handle = self
            .sessions
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FormsyncError::NotFound(format!("session {key} not found")))?;

        let (form, validation_errors) = {
            let record = handle.record.lock();
            (record.form.clone(), record.validation_errors.clone())
        };

        let notes = match self.analyzer.analyze(&form, &validation_errors).await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(key, error = %e, "form analysis failed, continuing without notes");
                Vec::new()
            }
        };

        let mut record = handle.record.lock();
        record.ai_notes = notes;
        record.analysis_updated_at = Some(chrono::Utc::now());
        self.hub.publish(key, &record.envelope(key));
        Ok(record.snapshot(key))
    }

    /// Subscribe to session updates. The snapshot and the subscription are
    /// taken under the same lock, so no update can fall between them: the
    /// caller sees the snapshot first and every later commit after it.
    pub fn subscribe(&self, key: &str) -> (SessionSnapshot, Subscription) {
        let handle = self.ensure(key);
        let record = handle.record.lock();
        let subscription = self.hub.subscribe(key);
        (record.snapshot(key), subscription)
    }

    /// Every live session, unordered.
    pub fn list(&self) -> Vec<SessionListEntry> {
        self.sessions
            .iter()
            .map(|entry| {
                let record = entry.value().record.lock();
                SessionListEntry {
                    key: entry.key().clone(),
                    created_at: record.created_at,
                    last_updated: record.last_updated,
                }
            })
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }
}
