use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::error;

use voicenotes_core::{NewVoiceNote, VoiceNote};
use voicenotes_media::{MediaError, MediaStore};
use voicenotes_store::RecordStore;
use voicenotes_transcriber::{RunRegistry, Transcriber};

/// Shared application state for API handlers.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub media: Arc<MediaStore>,
    pub transcriber: Arc<Transcriber>,
    pub registry: Arc<RunRegistry>,
    pub body_limit: usize,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": message.into() })))
}

fn store_error(e: anyhow::Error) -> ApiError {
    error!(error = %e, "Record store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
}

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/api/v1/voice-notes",
            get(list_voice_notes).post(create_voice_note),
        )
        .route(
            "/api/v1/voice-notes/{id}",
            get(get_voice_note)
                .put(update_voice_note)
                .delete(delete_voice_note),
        )
        .route(
            "/api/v1/voice-notes/{id}/transcription",
            get(get_transcription),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Voice Notes API is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "voicenotes",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/v1/voice-notes — upload an audio file and create a voice note.
///
/// Saves the file, creates the `pending` record, then fires off the
/// transcription run; the response does not wait for transcription progress.
async fn create_voice_note(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<VoiceNote>, ApiError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file: Option<(String, String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = Some(field.text().await.map_err(|e| {
                    api_error(StatusCode::BAD_REQUEST, format!("invalid title field: {e}"))
                })?);
            }
            "description" => {
                description = Some(field.text().await.map_err(|e| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        format!("invalid description field: {e}"),
                    )
                })?);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    api_error(StatusCode::BAD_REQUEST, format!("failed to read upload: {e}"))
                })?;
                file = Some((file_name, mime_type, data));
            }
            _ => {}
        }
    }

    let title = validate_title(title.as_deref())?;
    let (file_name, mime_type, data) = file
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing file field"))?;

    let saved = state.media.save(&file_name, &data).await.map_err(|e| match e {
        MediaError::Io(inner) => {
            error!(error = %inner, "Failed to persist upload");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to store upload")
        }
        rejected => api_error(StatusCode::BAD_REQUEST, rejected.to_string()),
    })?;

    let note = match state
        .store
        .create(NewVoiceNote {
            title,
            description,
            file_path: saved.path.clone(),
            file_name: saved.original_name,
            file_size: saved.size as i64,
            mime_type,
            duration: None,
        })
        .await
    {
        Ok(note) => note,
        Err(e) => {
            // The record never existed; don't leave the file orphaned.
            state.media.delete(&saved.path).await;
            return Err(store_error(e));
        }
    };

    state.transcriber.start(note.id, note.file_path.clone());
    Ok(Json(note))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct VoiceNoteList {
    items: Vec<VoiceNote>,
    total: u64,
    page: u32,
    per_page: u32,
    pages: u64,
}

/// GET /api/v1/voice-notes — paginated list, newest first.
async fn list_voice_notes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<VoiceNoteList>, ApiError> {
    let (page, per_page) = clamp_pagination(params.page, params.per_page);
    let (items, total) = state.store.list(page, per_page).await.map_err(store_error)?;
    Ok(Json(VoiceNoteList {
        items,
        total,
        page,
        per_page,
        pages: total.div_ceil(u64::from(per_page)),
    }))
}

/// GET /api/v1/voice-notes/{id}
async fn get_voice_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<VoiceNote>, ApiError> {
    match state.store.get(id).await.map_err(store_error)? {
        Some(note) => Ok(Json(note)),
        None => Err(api_error(StatusCode::NOT_FOUND, "Voice note not found")),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateVoiceNote {
    title: Option<String>,
    description: Option<String>,
}

/// PUT /api/v1/voice-notes/{id} — metadata only; transcription fields are
/// owned by the orchestrator and cannot be touched here.
async fn update_voice_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<UpdateVoiceNote>,
) -> Result<Json<VoiceNote>, ApiError> {
    let title = match update.title {
        Some(ref t) => Some(validate_title(Some(t.as_str()))?),
        None => None,
    };
    match state
        .store
        .update_metadata(id, title, update.description)
        .await
        .map_err(store_error)?
    {
        Some(note) => Ok(Json(note)),
        None => Err(api_error(StatusCode::NOT_FOUND, "Voice note not found")),
    }
}

/// DELETE /api/v1/voice-notes/{id} — cancels any in-flight transcription run
/// first so it cannot write into the deleted (or later reused) id.
async fn delete_voice_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let Some(note) = state.store.get(id).await.map_err(store_error)? else {
        return Err(api_error(StatusCode::NOT_FOUND, "Voice note not found"));
    };

    state.registry.cancel(id);
    state.media.delete(&note.file_path).await;
    state.store.delete(id).await.map_err(store_error)?;
    Ok(Json(json!({ "message": "Voice note deleted successfully" })))
}

#[derive(Debug, Serialize)]
struct TranscriptionResponse {
    id: i64,
    transcription_text: Option<String>,
    transcription_status: voicenotes_core::TranscriptionStatus,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/v1/voice-notes/{id}/transcription
async fn get_transcription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    match state.store.get(id).await.map_err(store_error)? {
        Some(note) => Ok(Json(TranscriptionResponse {
            id: note.id,
            transcription_text: note.transcription_text,
            transcription_status: note.transcription_status,
            created_at: note.created_at,
            updated_at: note.updated_at,
        })),
        None => Err(api_error(StatusCode::NOT_FOUND, "Voice note not found")),
    }
}

fn validate_title(title: Option<&str>) -> Result<String, ApiError> {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "title must not be empty"))?;
    if title.len() > 255 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "title must be at most 255 characters",
        ));
    }
    Ok(title.to_string())
}

fn clamp_pagination(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = match per_page.unwrap_or(20) {
        0 => 20,
        p if p > 100 => 20,
        p => p,
    };
    (page, per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_out_of_range_values() {
        assert_eq!(clamp_pagination(None, None), (1, 20));
        assert_eq!(clamp_pagination(Some(0), Some(0)), (1, 20));
        assert_eq!(clamp_pagination(Some(3), Some(50)), (3, 50));
        assert_eq!(clamp_pagination(Some(2), Some(500)), (2, 20));
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title(Some("  memo  ")).unwrap(), "memo");
        assert!(validate_title(None).is_err());
        assert!(validate_title(Some("   ")).is_err());
        assert!(validate_title(Some(&"x".repeat(256))).is_err());
        assert_eq!(
            validate_title(Some(&"x".repeat(255))).unwrap().len(),
            255
        );
    }
}
