use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaObject {
    pub id: Uuid,
    pub secure_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub course_id: Option<Uuid>,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub purged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MediaObject {
    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}
