use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub answers: Option<JsonValue>,
    pub score: Option<i32>,
    pub total_points: Option<i32>,
    pub percentage: Option<rust_decimal::Decimal>,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    /// Autosaved answers as question id -> selected option.
    pub fn answer_map(&self) -> HashMap<Uuid, String> {
        self.answers
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}
