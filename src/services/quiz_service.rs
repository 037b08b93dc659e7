use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::quiz::Quiz;
use crate::models::quiz_question::QuizQuestion;

#[derive(Clone)]
pub struct QuizService {
    pool: PgPool,
}

impl QuizService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a quiz, checking that it belongs to the given course via its
    /// section. A quiz id from another course reads as absent.
    pub async fn get_quiz_for_course(&self, quiz_id: Uuid, course_id: Uuid) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"SELECT q.id, q.section_id, q.title, q.passing_score,
                      q.time_limit_minutes, q.max_attempts, q.created_at, q.updated_at
               FROM quizzes q
               JOIN sections s ON s.id = q.section_id
               WHERE q.id = $1 AND s.course_id = $2"#,
        )
        .bind(quiz_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(quiz)
    }

    pub async fn list_questions(&self, quiz_id: Uuid) -> Result<Vec<QuizQuestion>> {
        let questions = sqlx::query_as::<_, QuizQuestion>(
            r#"SELECT id, quiz_id, prompt, options, correct_answer, points, position
               FROM quiz_questions
               WHERE quiz_id = $1
               ORDER BY position ASC"#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    pub async fn question_count(&self, quiz_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM quiz_questions WHERE quiz_id = $1"#)
                .bind(quiz_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
