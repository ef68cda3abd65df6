//! HTTP request handlers.
//!
//! Each handler is a thin adapter from the wire types to the session
//! façade, the application store, or the analysis collaborators. Errors
//! cross the boundary as `FormsyncError` and pick up their status code
//! and `{message, fieldErrors}` body in one place.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::types::*;
use crate::analysis::{DocumentAnalyzer, DocumentInput, FormAnalyzer};
use crate::error::FormsyncError;
use crate::form::{decode_attachment, validate_mime_type, validate_pesel};
use crate::session::{BroadcastHub, SessionService, SessionSnapshot};
use crate::store::{ApplicationPatch, ApplicationStore, ListFilter};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Application state shared across all handlers.
pub struct AppState {
    pub sessions: SessionService,
    pub store: ApplicationStore,
    pub documents: Arc<dyn DocumentAnalyzer>,
    /// Seconds between SSE keep-alive comments
    pub heartbeat_secs: u64,
    /// Shutdown token for graceful server shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        hub: Arc<BroadcastHub>,
        analyzer: Arc<dyn FormAnalyzer>,
        documents: Arc<dyn DocumentAnalyzer>,
        heartbeat_secs: u64,
    ) -> (Arc<Self>, CancellationToken) {
        let shutdown_token = CancellationToken::new();
        let state = Arc::new(Self {
            sessions: SessionService::new(hub, analyzer),
            store: ApplicationStore::new(),
            documents,
            heartbeat_secs,
            shutdown_token: shutdown_token.clone(),
        });
        (state, shutdown_token)
    }
}

// =============================================================================
// Health
// =============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// =============================================================================
// Session sync: webhook, manual sync, snapshot, stream, analyse, list
// =============================================================================

/// Agent webhook. The key comes from the `callId` query parameter, the
/// payload's `conversation_id`, or falls back to `"default"`. A delivery
/// whose updates cannot be parsed or merged is logged and skipped rather
/// than failed: the agent cannot repair a rejected turn, and the next
/// delivery carries fresh state anyway. The session is stamped and
/// republished either way.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    Json(payload): Json<WebhookPayload>,
) -> Json<WebhookResponse> {
    let key = query
        .call_id
        .or(payload.conversation_id)
        .unwrap_or_else(|| "default".to_string());

    let updates: Option<Map<String, Value>> = match payload.form_data {
        Some(updates) => Some(updates),
        None => payload.serialized_form_data.as_deref().and_then(|raw| {
            match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(key, error = %e, "could not parse serialized_form_data");
                    None
                }
            }
        }),
    };

    let snapshot = match updates {
        Some(updates) if !updates.is_empty() => {
            match state.sessions.apply_updates(&key, &updates) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(key, error = %e, "webhook update rejected, keeping previous state");
                    state.sessions.touch(&key)
                }
            }
        }
        _ => state.sessions.touch(&key),
    };

    Json(WebhookResponse::from_snapshot(snapshot))
}

/// Manual wizard sync: wholesale document replacement, optional re-analysis.
pub async fn sync_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SessionSnapshot>, FormsyncError> {
    let snapshot = state.sessions.replace(&key, req.form_data, req.analyse).await?;
    Ok(Json(snapshot))
}

/// Current session state; creates the session on first read.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<SessionSnapshot> {
    Json(state.sessions.snapshot(&key))
}

/// Live update stream. The first event is a snapshot of the current
/// state, every later event is a post-commit envelope, and keep-alive
/// comments flow while the session is quiet. Dropping the connection
/// drops the subscription, which deregisters the queue.
pub async fn stream_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (snapshot, subscription) = state.sessions.subscribe(&key);
    info!(key, "stream subscriber connected");

    let initial = snapshot.into_envelope();
    let updates = stream::unfold(subscription, |mut subscription| async move {
        subscription
            .recv()
            .await
            .map(|envelope| (envelope, subscription))
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|envelope| {
            let data = serde_json::to_string(&envelope).unwrap_or_else(|e| {
                warn!(error = %e, "failed to serialize stream envelope");
                String::from("{}")
            });
            Ok(Event::default().data(data))
        });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.heartbeat_secs))
            .text("keep-alive"),
    )
}

/// Run analysis over the current document. 404 for keys nobody ever
/// touched; a failing collaborator yields an empty note list, not an
/// error.
pub async fn analyse_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<AnalyseResponse>, FormsyncError> {
    let snapshot = state.sessions.analyse(&key).await?;
    Ok(Json(AnalyseResponse {
        key: snapshot.key,
        ai_notes: snapshot.ai_notes,
        analysis_updated_at: snapshot.analysis_updated_at,
    }))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<ListSessionsResponse> {
    let sessions = state.sessions.list();
    let count = sessions.len();
    Json(ListSessionsResponse { sessions, count })
}

// =============================================================================
// Application CRUD
// =============================================================================

pub async fn create_application(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<Response, FormsyncError> {
    if let Err(detail) = validate_pesel(&req.form_data.poszkodowany.pesel) {
        return Err(FormsyncError::field("Validation failed", "pesel", detail));
    }
    check_ai_suggestion(req.ai_suggestion)?;

    // Every inline attachment must pass before the record exists.
    let mut decoded = Vec::with_capacity(req.attachments.len());
    for (idx, attachment) in req.attachments.iter().enumerate() {
        if let Err(detail) = validate_mime_type(&attachment.mime_type) {
            return Err(FormsyncError::field(
                "Attachment validation failed",
                format!("attachments[{idx}].mime_type"),
                detail,
            ));
        }
        let data = decode_attachment(&attachment.data).map_err(|detail| {
            FormsyncError::field(
                "Attachment validation failed",
                format!("attachments[{idx}].data"),
                detail,
            )
        })?;
        decoded.push(data);
    }

    let mut record = state
        .store
        .create(req.form_data, req.status, req.ai_suggestion, req.ai_comments);
    if !req.attachments.is_empty() {
        for (attachment, data) in req.attachments.iter().zip(decoded) {
            let _ = state
                .store
                .create_attachment(&record.id, &attachment.title, &attachment.mime_type, data);
        }
        if let Some(refreshed) = state.store.get(&record.id) {
            record = refreshed;
        }
    }
    info!(id = %record.id, attachments = record.attachment_ids.len(), "application created");
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListApplicationsQuery>,
) -> Result<Json<ListApplicationsResponse>, FormsyncError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(FormsyncError::field(
            "Validation failed",
            "page",
            "page must be >= 1",
        ));
    }
    if page_size < 1 || page_size > MAX_PAGE_SIZE {
        return Err(FormsyncError::field(
            "Validation failed",
            "page_size",
            format!("page_size must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }

    let filter = ListFilter {
        pesel: query.pesel,
        date_from: query.date_from,
        date_to: query.date_to,
        status: query.status,
    };
    let (records, total) = state.store.list(page, page_size, &filter);

    Ok(Json(ListApplicationsResponse {
        items: records.iter().map(ApplicationListItem::from_record).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> Result<Json<crate::store::ApplicationRecord>, FormsyncError> {
    state
        .store
        .get(&app_id)
        .map(Json)
        .ok_or_else(|| application_not_found(&app_id))
}

pub async fn update_application(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    Json(req): Json<UpdateApplicationRequest>,
) -> Result<Json<crate::store::ApplicationRecord>, FormsyncError> {
    if let Some(form) = &req.form_data {
        if let Err(detail) = validate_pesel(&form.poszkodowany.pesel) {
            return Err(FormsyncError::field("Validation failed", "pesel", detail));
        }
    }
    check_ai_suggestion(req.ai_suggestion)?;

    let patch = ApplicationPatch {
        form_data: req.form_data,
        ai_suggestion: req.ai_suggestion,
        ai_comments: req.ai_comments,
        status: req.status,
    };
    state
        .store
        .update(&app_id, patch)
        .map(Json)
        .ok_or_else(|| application_not_found(&app_id))
}

pub async fn delete_application(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> Result<StatusCode, FormsyncError> {
    if state.store.delete(&app_id) {
        info!(id = %app_id, "application deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(application_not_found(&app_id))
    }
}

// =============================================================================
// Attachments
// =============================================================================

pub async fn create_attachment(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    Json(req): Json<CreateAttachmentRequest>,
) -> Result<Response, FormsyncError> {
    if let Err(detail) = validate_mime_type(&req.mime_type) {
        return Err(FormsyncError::field(
            "Attachment validation failed",
            "mime_type",
            detail,
        ));
    }
    let data = decode_attachment(&req.data)
        .map_err(|detail| FormsyncError::field("Attachment validation failed", "data", detail))?;

    let attachment = state
        .store
        .create_attachment(&app_id, &req.title, &req.mime_type, data)
        .ok_or_else(|| application_not_found(&app_id))?;

    let attachments = state
        .store
        .list_attachments(&app_id)
        .unwrap_or_default();

    Ok((
        StatusCode::CREATED,
        Json(CreateAttachmentResponse {
            attachment,
            attachments,
        }),
    )
        .into_response())
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<crate::store::AttachmentMetadata>>, FormsyncError> {
    state
        .store
        .list_attachments(&app_id)
        .map(Json)
        .ok_or_else(|| application_not_found(&app_id))
}

pub async fn get_attachment(
    State(state): State<Arc<AppState>>,
    Path((app_id, attachment_id)): Path<(String, String)>,
) -> Result<Response, FormsyncError> {
    let attachment = state
        .store
        .get_attachment(&app_id, &attachment_id)
        .ok_or_else(|| {
            FormsyncError::NotFound(format!(
                "Attachment '{attachment_id}' not found for application '{app_id}'"
            ))
        })?;

    let disposition = format!("attachment; filename=\"{}\"", attachment.title);
    Ok((
        [
            (header::CONTENT_TYPE, attachment.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        attachment.data,
    )
        .into_response())
}

pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Path((app_id, attachment_id)): Path<(String, String)>,
) -> Result<StatusCode, FormsyncError> {
    if state.store.delete_attachment(&app_id, &attachment_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(FormsyncError::NotFound(format!(
            "Attachment '{attachment_id}' not found for application '{app_id}'"
        )))
    }
}

// =============================================================================
// Stateless document grading
// =============================================================================

/// Grade uploaded documents in memory, no persistence. Unlike session
/// analysis there is no state to fall back to, so a collaborator failure
/// surfaces as 502.
pub async fn analyse_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyseDocumentsRequest>,
) -> Result<Json<AnalyseDocumentsResponse>, FormsyncError> {
    if req.files.is_empty() {
        return Err(FormsyncError::field(
            "At least one file is required",
            "files",
            "At least one file is required",
        ));
    }

    let mut field_errors = BTreeMap::new();
    let mut inputs = Vec::with_capacity(req.files.len());
    for (idx, file) in req.files.iter().enumerate() {
        if let Err(detail) = validate_mime_type(&file.mime_type) {
            field_errors.insert(format!("files[{idx}].mime_type"), detail);
            continue;
        }
        match decode_attachment(&file.data) {
            Ok(data) => inputs.push(DocumentInput {
                filename: file.filename.clone(),
                mime_type: file.mime_type.clone(),
                data,
            }),
            Err(detail) => {
                field_errors.insert(format!("files[{idx}].data"), detail);
            }
        }
    }

    if !field_errors.is_empty() {
        return Err(FormsyncError::Validation {
            message: "File validation failed".to_string(),
            field_errors,
        });
    }

    let opinion = state.documents.analyse_documents(&inputs).await?;
    Ok(Json(AnalyseDocumentsResponse::from_opinion(opinion)))
}

fn application_not_found(app_id: &str) -> FormsyncError {
    FormsyncError::NotFound(format!("Application with id '{app_id}' not found"))
}

fn check_ai_suggestion(value: Option<f64>) -> Result<(), FormsyncError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(FormsyncError::field(
            "Validation failed",
            "ai_suggestion",
            "ai_suggestion must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::NoopAnalyzer;
    use crate::form::AccidentReportForm;
    use crate::session::DEFAULT_SUBSCRIBER_CAPACITY;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use tower::ServiceExt;

    const VALID_PESEL: &str = "44051401359";

    fn create_test_app() -> Router {
        let (state, _shutdown) = AppState::new(
            Arc::new(BroadcastHub::new(DEFAULT_SUBSCRIBER_CAPACITY)),
            Arc::new(NoopAnalyzer),
            Arc::new(NoopAnalyzer),
            15,
        );
        crate::server::create_router(state)
    }

    fn valid_form() -> AccidentReportForm {
        let mut form = AccidentReportForm::default();
        form.poszkodowany.imie = "Jan".into();
        form.poszkodowany.nazwisko = "Kowalski".into();
        form.poszkodowany.pesel = VALID_PESEL.into();
        form.szczegoly.data = "2026-08-01".into();
        form.szczegoly.miejsce = "Warszawa".into();
        form
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn health_returns_200_with_version() {
            let app = create_test_app();
            let response = app.oneshot(get_request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["status"], "ok");
            assert!(!body["version"].as_str().unwrap().is_empty());
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn snapshot_lazily_creates_session() {
            let app = create_test_app();
            let response = app
                .oneshot(get_request("/api/sessions/conv-1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["key"], "conv-1");
            assert!(body["form_data"].is_object());
            assert!(body["last_updated"].is_null());
        }

        #[tokio::test]
        async fn webhook_applies_dotted_updates() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook?callId=conv-2",
                    serde_json::json!({
                        "form_data": {"poszkodowany.imie": "Jan"}
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["key"], "conv-2");
            assert_eq!(body["form_data"]["poszkodowany"]["imie"], "Jan");
        }

        #[tokio::test]
        async fn webhook_key_falls_back_to_payload_then_default() {
            let app = create_test_app();
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook",
                    serde_json::json!({"conversation_id": "from-payload"}),
                ))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["key"], "from-payload");

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook",
                    serde_json::json!({}),
                ))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["key"], "default");
        }

        #[tokio::test]
        async fn webhook_accepts_serialized_form_data() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook?callId=conv-3",
                    serde_json::json!({
                        "serialized_form_data": "{\"poszkodowany.nazwisko\": \"Nowak\"}"
                    }),
                ))
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body["form_data"]["poszkodowany"]["nazwisko"], "Nowak");
        }

        #[tokio::test]
        async fn webhook_survives_unparseable_serialized_data() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook?callId=conv-4",
                    serde_json::json!({"serialized_form_data": "not json"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["success"], true);
        }

        #[tokio::test]
        async fn webhook_survives_rejected_merge() {
            let app = create_test_app();
            // First give the session some state.
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook?callId=conv-5",
                    serde_json::json!({"form_data": {"poszkodowany.imie": "Jan"}}),
                ))
                .await
                .unwrap();

            // A merge that fails the schema gate does not fail the webhook.
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/webhook?callId=conv-5",
                    serde_json::json!({"form_data": {"poszkodowany": 5}}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["form_data"]["poszkodowany"]["imie"], "Jan");
        }

        #[tokio::test]
        async fn manual_sync_replaces_document() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "PUT",
                    "/api/sessions/conv-6",
                    serde_json::json!({
                        "form_data": serde_json::to_value(valid_form()).unwrap()
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["form_data"]["poszkodowany"]["imie"], "Jan");
            assert!(body["is_complete"].as_bool().unwrap());
        }

        #[tokio::test]
        async fn analyse_unknown_session_is_404() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/never-seen/analyse",
                    serde_json::json!({}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn analyse_initialized_session_stamps_timestamp() {
            let app = create_test_app();
            app.clone()
                .oneshot(get_request("/api/sessions/conv-7"))
                .await
                .unwrap();

            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/sessions/conv-7/analyse",
                    serde_json::json!({}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert!(body["analysis_updated_at"].is_string());
            assert!(body["ai_notes"].as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn list_sessions_counts_live_keys() {
            let app = create_test_app();
            app.clone()
                .oneshot(get_request("/api/sessions/a"))
                .await
                .unwrap();
            app.clone()
                .oneshot(get_request("/api/sessions/b"))
                .await
                .unwrap();

            let response = app.oneshot(get_request("/api/sessions")).await.unwrap();
            let body = body_json(response).await;
            assert_eq!(body["count"], 2);
            assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
        }

        #[tokio::test]
        async fn stream_responds_with_event_stream() {
            let app = create_test_app();
            let response = app
                .oneshot(get_request("/api/sessions/conv-8/stream"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap();
            assert!(content_type.starts_with("text/event-stream"));
        }
    }

    mod application_tests {
        use super::*;

        async fn create_app_record(app: &Router) -> String {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/applications",
                    serde_json::json!({
                        "form_data": serde_json::to_value(valid_form()).unwrap()
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            body_json(response).await["id"].as_str().unwrap().to_string()
        }

        #[tokio::test]
        async fn create_attaches_inline_documents() {
            let app = create_test_app();
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/applications",
                    serde_json::json!({
                        "form_data": serde_json::to_value(valid_form()).unwrap(),
                        "attachments": [{
                            "title": "protokol.pdf",
                            "mime_type": "application/pdf",
                            "data": BASE64.encode(b"pdf bytes"),
                        }],
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let body = body_json(response).await;
            assert_eq!(body["attachment_ids"].as_array().unwrap().len(), 1);

            let id = body["id"].as_str().unwrap();
            let response = app
                .oneshot(get_request(&format!("/api/applications/{id}/attachments")))
                .await
                .unwrap();
            let listing = body_json(response).await;
            assert_eq!(listing.as_array().unwrap().len(), 1);
            assert_eq!(listing[0]["title"], "protokol.pdf");
        }

        #[tokio::test]
        async fn bad_inline_attachment_creates_nothing() {
            let app = create_test_app();
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/applications",
                    serde_json::json!({
                        "form_data": serde_json::to_value(valid_form()).unwrap(),
                        "attachments": [{
                            "title": "wirus.exe",
                            "mime_type": "application/x-msdownload",
                            "data": BASE64.encode(b"mz"),
                        }],
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["fieldErrors"]["attachments[0].mime_type"].is_string());

            let response = app.oneshot(get_request("/api/applications")).await.unwrap();
            assert_eq!(body_json(response).await["total"], 0);
        }

        #[tokio::test]
        async fn create_validates_pesel() {
            let app = create_test_app();
            let mut form = valid_form();
            form.poszkodowany.pesel = "12345678901".into();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/applications",
                    serde_json::json!({"form_data": serde_json::to_value(form).unwrap()}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["fieldErrors"]["pesel"].is_string());
        }

        #[tokio::test]
        async fn crud_lifecycle() {
            let app = create_test_app();
            let id = create_app_record(&app).await;

            let response = app
                .clone()
                .oneshot(get_request(&format!("/api/applications/{id}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let response = app
                .clone()
                .oneshot(json_request(
                    "PATCH",
                    &format!("/api/applications/{id}"),
                    serde_json::json!({"status": "accepted"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["status"], "accepted");

            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(format!("/api/applications/{id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);

            let response = app
                .oneshot(get_request(&format!("/api/applications/{id}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn ai_suggestion_must_be_in_unit_interval() {
            let app = create_test_app();
            let id = create_app_record(&app).await;
            let response = app
                .oneshot(json_request(
                    "PATCH",
                    &format!("/api/applications/{id}"),
                    serde_json::json!({"ai_suggestion": 1.5}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn list_filters_by_pesel_and_paginates() {
            let app = create_test_app();
            create_app_record(&app).await;
            create_app_record(&app).await;

            let response = app
                .clone()
                .oneshot(get_request(&format!(
                    "/api/applications?pesel={VALID_PESEL}&page=1&page_size=1"
                )))
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body["total"], 2);
            assert_eq!(body["items"].as_array().unwrap().len(), 1);
            assert_eq!(body["page_size"], 1);

            let response = app
                .oneshot(get_request("/api/applications?pesel=00000000000"))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["total"], 0);
        }

        #[tokio::test]
        async fn list_defaults_to_ten_per_page() {
            let app = create_test_app();
            create_app_record(&app).await;

            let response = app.oneshot(get_request("/api/applications")).await.unwrap();
            let body = body_json(response).await;
            assert_eq!(body["page"], 1);
            assert_eq!(body["page_size"], 10);
        }

        #[tokio::test]
        async fn list_rejects_out_of_range_page_size() {
            let app = create_test_app();
            let response = app
                .oneshot(get_request("/api/applications?page_size=500"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn list_item_carries_summary_and_counts() {
            let app = create_test_app();
            create_app_record(&app).await;
            let response = app.oneshot(get_request("/api/applications")).await.unwrap();
            let body = body_json(response).await;
            let item = &body["items"][0];
            assert_eq!(item["summary"], "Warszawa");
            assert_eq!(item["attachment_count"], 0);
        }
    }

    mod attachment_tests {
        use super::*;

        async fn create_app_record(app: &Router) -> String {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/applications",
                    serde_json::json!({
                        "form_data": serde_json::to_value(valid_form()).unwrap()
                    }),
                ))
                .await
                .unwrap();
            body_json(response).await["id"].as_str().unwrap().to_string()
        }

        #[tokio::test]
        async fn upload_download_round_trip() {
            let app = create_test_app();
            let id = create_app_record(&app).await;
            let payload = BASE64.encode(b"fake pdf bytes");

            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/api/applications/{id}/attachments"),
                    serde_json::json!({
                        "title": "skan.pdf",
                        "mime_type": "application/pdf",
                        "data": payload
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let body = body_json(response).await;
            let att_id = body["attachment"]["id"].as_str().unwrap().to_string();
            assert_eq!(body["attachments"].as_array().unwrap().len(), 1);

            let response = app
                .oneshot(get_request(&format!(
                    "/api/applications/{id}/attachments/{att_id}"
                )))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                "application/pdf"
            );
            assert!(response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("skan.pdf"));
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&bytes[..], b"fake pdf bytes");
        }

        #[tokio::test]
        async fn upload_rejects_disallowed_mime_type() {
            let app = create_test_app();
            let id = create_app_record(&app).await;
            let response = app
                .oneshot(json_request(
                    "POST",
                    &format!("/api/applications/{id}/attachments"),
                    serde_json::json!({
                        "title": "x.exe",
                        "mime_type": "application/x-msdownload",
                        "data": BASE64.encode(b"nope")
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn delete_attachment_then_404_on_fetch() {
            let app = create_test_app();
            let id = create_app_record(&app).await;
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/api/applications/{id}/attachments"),
                    serde_json::json!({
                        "title": "skan.pdf",
                        "mime_type": "application/pdf",
                        "data": BASE64.encode(b"bytes")
                    }),
                ))
                .await
                .unwrap();
            let att_id = body_json(response).await["attachment"]["id"]
                .as_str()
                .unwrap()
                .to_string();

            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(format!("/api/applications/{id}/attachments/{att_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);

            let response = app
                .oneshot(get_request(&format!(
                    "/api/applications/{id}/attachments/{att_id}"
                )))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    mod document_analysis_tests {
        use super::*;

        #[tokio::test]
        async fn empty_file_list_is_rejected() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/documents/analyse",
                    serde_json::json!({"files": []}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn invalid_files_report_indexed_field_errors() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/documents/analyse",
                    serde_json::json!({"files": [
                        {"filename": "a.exe", "mime_type": "application/x-msdownload",
                         "data": BASE64.encode(b"x")},
                        {"filename": "b.pdf", "mime_type": "application/pdf",
                         "data": "!!! not base64 !!!"}
                    ]}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["fieldErrors"]["files[0].mime_type"].is_string());
            assert!(body["fieldErrors"]["files[1].data"].is_string());
        }

        #[tokio::test]
        async fn missing_collaborator_is_bad_gateway() {
            let app = create_test_app();
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/documents/analyse",
                    serde_json::json!({"files": [
                        {"filename": "a.pdf", "mime_type": "application/pdf",
                         "data": BASE64.encode(b"x")}
                    ]}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
    }
}
