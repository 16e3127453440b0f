use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::UserId;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub tag: String,
    pub color: String,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_trashed: bool,
    pub reminder_date: Option<chrono::DateTime<chrono::Utc>>,
    pub created_by: UserId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tag: Option<String>,
    pub color: Option<String>,
    pub reminder_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tag: Option<String>,
    pub color: Option<String>,
    pub reminder_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FindNotesResponse {
    pub results: Vec<Note>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteNoteResponse {
    pub message: String,
}
