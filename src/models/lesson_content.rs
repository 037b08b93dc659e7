use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// Playable/readable payload of a lesson, 1:1 with its lesson row.
/// `video_media_id` references `media_objects.id`; `is_free` alone decides
/// whether the video is viewable without enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LessonContent {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub video_media_id: Option<Uuid>,
    pub is_free: bool,
    pub duration_seconds: Option<i32>,
    pub body: Option<String>,
    pub resources: Option<JsonValue>,
}
