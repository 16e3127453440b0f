use axum::{
    extract::Path,
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};

use crate::{ctx::BaseParams, errors::Result, state::AppState};

use super::{handlers, CreateNote, DeleteNoteResponse, FindNotesResponse, Note, UpdateNote};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/notes", get(find_notes).post(create_note))
        // "trash/all" rather than "trash" so a note slugged "trash" stays addressable
        .route("/api/v1/notes/trash/all", get(find_trashed_notes))
        .route("/api/v1/notes/{slug}", get(get_note).patch(update_note))
        .route("/api/v1/notes/{slug}/trash", patch(trash_note))
        .route("/api/v1/notes/{slug}/restore", patch(restore_note))
        .route("/api/v1/notes/{slug}/permanent", delete(permanent_delete_note))
        .route("/api/v1/notes/{slug}/pin", patch(toggle_pin))
        .route("/api/v1/notes/{slug}/archive", patch(toggle_archive))
        .with_state(state)
}

async fn find_notes(base: BaseParams) -> Result<Json<FindNotesResponse>> {
    handlers::find_notes(base).await.map(Json)
}

async fn find_trashed_notes(base: BaseParams) -> Result<Json<FindNotesResponse>> {
    handlers::find_trashed_notes(base).await.map(Json)
}

async fn create_note(base: BaseParams, Json(args): Json<CreateNote>) -> Result<(StatusCode, Json<Note>)> {
    handlers::create_note(args, base)
        .await
        .map(|note| (StatusCode::CREATED, Json(note)))
}

async fn get_note(Path(slug): Path<String>, base: BaseParams) -> Result<Json<Note>> {
    handlers::get_note(slug, base).await.map(Json)
}

async fn update_note(
    Path(slug): Path<String>,
    base: BaseParams,
    Json(args): Json<UpdateNote>,
) -> Result<Json<Note>> {
    handlers::update_note(slug, args, base).await.map(Json)
}

async fn trash_note(Path(slug): Path<String>, base: BaseParams) -> Result<Json<Note>> {
    handlers::trash_note(slug, base).await.map(Json)
}

async fn restore_note(Path(slug): Path<String>, base: BaseParams) -> Result<Json<Note>> {
    handlers::restore_note(slug, base).await.map(Json)
}

async fn permanent_delete_note(
    Path(slug): Path<String>,
    base: BaseParams,
) -> Result<Json<DeleteNoteResponse>> {
    handlers::permanent_delete_note(slug, base).await.map(Json)
}

async fn toggle_pin(Path(slug): Path<String>, base: BaseParams) -> Result<Json<Note>> {
    handlers::toggle_pin(slug, base).await.map(Json)
}

async fn toggle_archive(Path(slug): Path<String>, base: BaseParams) -> Result<Json<Note>> {
    handlers::toggle_archive(slug, base).await.map(Json)
}
