use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::services::grading_service::QuestionOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: Uuid,
    pub status: String,
    pub score: Option<i32>,
    pub total_points: Option<i32>,
    pub passed: Option<bool>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub deadline_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&crate::models::quiz_attempt::QuizAttempt> for AttemptSummary {
    fn from(a: &crate::models::quiz_attempt::QuizAttempt) -> Self {
        Self {
            id: a.id,
            status: a.status.clone(),
            score: a.score,
            total_points: a.total_points,
            passed: a.passed,
            started_at: a.started_at,
            deadline_at: a.deadline_at,
            completed_at: a.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt: AttemptSummary,
    pub attempts_remaining: i64,
}

/// Question as exposed to a learner mid-attempt. The correct answer has no
/// field here on purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub prompt: String,
    pub options: Vec<String>,
    pub points: i32,
    pub position: i32,
}

impl From<&crate::models::quiz_question::QuizQuestion> for PublicQuestion {
    fn from(q: &crate::models::quiz_question::QuizQuestion) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            options: q.option_list(),
            points: q.points,
            position: q.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswersRequest {
    pub answers: HashMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswersResponse {
    pub saved: bool,
    pub answered: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub answers: HashMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt: AttemptSummary,
    pub percentage: f64,
    pub results: HashMap<Uuid, QuestionOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizInfo {
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptHistoryResponse {
    pub attempts: Vec<AttemptSummary>,
    pub best_attempt: Option<AttemptSummary>,
    pub attempts_remaining: i64,
    pub quiz: QuizInfo,
}
