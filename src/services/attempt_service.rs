use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::quiz::Quiz;
use crate::models::quiz_attempt::{self, QuizAttempt};
use crate::models::quiz_question::QuizQuestion;
use crate::services::grading_service::{GradeResult, GradingService};

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count_attempts(&self, user_id: Uuid, quiz_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2"#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Start a new attempt. The attempt-limit check and the insert are not
    /// a single statement; the limit is a product rule, not a uniqueness
    /// guarantee, and a rare off-by-one under concurrent starts is accepted.
    pub async fn start_attempt(&self, user_id: Uuid, quiz: &Quiz) -> Result<QuizAttempt> {
        let used = self.count_attempts(user_id, quiz.id).await?;
        if used >= quiz.max_attempts as i64 {
            return Err(Error::Conflict("no_attempts_remaining".to_string()));
        }

        let now = Utc::now();
        let deadline = quiz
            .time_limit_minutes
            .map(|minutes| now + Duration::minutes(minutes as i64));

        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (quiz_id, user_id, status, started_at, deadline_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(quiz.id)
        .bind(user_id)
        .bind(quiz_attempt::STATUS_IN_PROGRESS)
        .bind(now)
        .bind(deadline)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(attempt_id = %attempt.id, quiz_id = %quiz.id, "attempt started");
        Ok(attempt)
    }

    /// Fetch one attempt scoped to its owner and quiz. Someone else's
    /// attempt id reads as absent.
    pub async fn get_attempt(
        &self,
        attempt_id: Uuid,
        user_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<QuizAttempt> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"SELECT * FROM quiz_attempts WHERE id = $1 AND user_id = $2 AND quiz_id = $3"#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    pub async fn list_attempts(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Vec<QuizAttempt>> {
        let attempts = sqlx::query_as::<_, QuizAttempt>(
            r#"SELECT * FROM quiz_attempts
               WHERE user_id = $1 AND quiz_id = $2
               ORDER BY started_at DESC"#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    /// Merge autosaved answers into the attempt while it is still open.
    /// The jsonb concatenation keeps concurrent autosaves atomic.
    pub async fn save_answers(
        &self,
        attempt_id: Uuid,
        user_id: Uuid,
        answers: &HashMap<Uuid, String>,
    ) -> Result<QuizAttempt> {
        let merged = serde_json::to_value(answers)?;
        let updated = sqlx::query_as::<_, QuizAttempt>(
            r#"
            UPDATE quiz_attempts
            SET answers = COALESCE(answers, '{}'::jsonb) || $3::jsonb, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status = $4
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .bind(merged)
        .bind(quiz_attempt::STATUS_IN_PROGRESS)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(attempt) => Ok(attempt),
            None => {
                // Distinguish "completed" from "no such attempt".
                let existing = sqlx::query_as::<_, QuizAttempt>(
                    r#"SELECT * FROM quiz_attempts WHERE id = $1 AND user_id = $2"#,
                )
                .bind(attempt_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
                match existing {
                    Some(_) => Err(Error::Conflict("attempt_already_completed".to_string())),
                    None => Err(Error::NotFound("attempt not found".to_string())),
                }
            }
        }
    }

    /// Score and complete an attempt. The completing write is conditional
    /// on the attempt still being open, so exactly one submit wins; the
    /// loser of a race gets `already_submitted`.
    ///
    /// A submit arriving after the recorded deadline (plus grace) is scored
    /// from the autosaved answers only; the late payload is discarded.
    pub async fn submit_attempt(
        &self,
        attempt: &QuizAttempt,
        quiz: &Quiz,
        questions: &[QuizQuestion],
        payload: &HashMap<Uuid, String>,
        grace_seconds: i64,
    ) -> Result<(QuizAttempt, GradeResult)> {
        if attempt.is_completed() {
            return Err(Error::Conflict("already_submitted".to_string()));
        }

        let now = Utc::now();
        let expired = is_past_deadline(attempt.deadline_at, now, grace_seconds);

        let mut answers = attempt.answer_map();
        if expired {
            tracing::warn!(
                attempt_id = %attempt.id,
                "submit after deadline, scoring autosaved answers only"
            );
        } else {
            answers.extend(payload.iter().map(|(k, v)| (*k, v.clone())));
        }

        let grade = GradingService::grade(questions, &answers, quiz.passing_score);
        let answers_json = serde_json::to_value(&answers)?;

        let updated = sqlx::query_as::<_, QuizAttempt>(
            r#"
            UPDATE quiz_attempts
            SET status = $2, answers = $3, score = $4, total_points = $5,
                percentage = $6, passed = $7, completed_at = $8, updated_at = $8
            WHERE id = $1 AND status <> $2
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(quiz_attempt::STATUS_COMPLETED)
        .bind(answers_json)
        .bind(grade.score)
        .bind(grade.total_points)
        .bind(grade.percentage_decimal())
        .bind(grade.passed)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(updated) = updated else {
            return Err(Error::Conflict("already_submitted".to_string()));
        };

        tracing::info!(
            attempt_id = %updated.id,
            score = grade.score,
            total_points = grade.total_points,
            passed = grade.passed,
            "attempt submitted"
        );
        Ok((updated, grade))
    }

    /// Auto-submit attempts whose deadline (plus grace) has passed, scoring
    /// whatever was autosaved. Returns how many attempts were closed.
    pub async fn sweep_overdue(&self, grace_seconds: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::seconds(grace_seconds);
        let overdue = sqlx::query_as::<_, QuizAttempt>(
            r#"SELECT * FROM quiz_attempts
               WHERE status = $1 AND deadline_at IS NOT NULL AND deadline_at < $2"#,
        )
        .bind(quiz_attempt::STATUS_IN_PROGRESS)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut closed = 0u64;
        for attempt in overdue {
            let quiz = sqlx::query_as::<_, Quiz>(
                r#"SELECT id, section_id, title, passing_score, time_limit_minutes,
                          max_attempts, created_at, updated_at
                   FROM quizzes WHERE id = $1"#,
            )
            .bind(attempt.quiz_id)
            .fetch_one(&self.pool)
            .await?;
            let questions = sqlx::query_as::<_, QuizQuestion>(
                r#"SELECT id, quiz_id, prompt, options, correct_answer, points, position
                   FROM quiz_questions WHERE quiz_id = $1 ORDER BY position ASC"#,
            )
            .bind(attempt.quiz_id)
            .fetch_all(&self.pool)
            .await?;

            match self
                .submit_attempt(&attempt, &quiz, &questions, &HashMap::new(), grace_seconds)
                .await
            {
                Ok(_) => closed += 1,
                // Lost the race against a live submit; nothing to do.
                Err(Error::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if closed > 0 {
            tracing::info!(closed, "auto-submitted overdue attempts");
        }
        Ok(closed)
    }
}

pub fn attempts_remaining(max_attempts: i32, used: i64) -> i64 {
    (max_attempts as i64 - used).max(0)
}

/// Best attempt: highest score among completed, ties broken by recency.
pub fn best_attempt(attempts: &[QuizAttempt]) -> Option<&QuizAttempt> {
    attempts
        .iter()
        .filter(|a| a.is_completed())
        .max_by(|a, b| {
            let score_a = a.score.unwrap_or(0);
            let score_b = b.score.unwrap_or(0);
            score_a
                .cmp(&score_b)
                .then(a.completed_at.cmp(&b.completed_at))
        })
}

fn is_past_deadline(
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace_seconds: i64,
) -> bool {
    match deadline {
        Some(deadline) => now > deadline + Duration::seconds(grace_seconds),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(status: &str, score: Option<i32>, completed_offset_min: i64) -> QuizAttempt {
        let now = Utc::now();
        QuizAttempt {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: status.to_string(),
            answers: None,
            score,
            total_points: Some(10),
            percentage: None,
            passed: None,
            started_at: now,
            deadline_at: None,
            completed_at: score.map(|_| now + Duration::minutes(completed_offset_min)),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    #[test]
    fn attempts_remaining_never_goes_negative() {
        assert_eq!(attempts_remaining(3, 0), 3);
        assert_eq!(attempts_remaining(3, 3), 0);
        assert_eq!(attempts_remaining(3, 5), 0);
    }

    #[test]
    fn best_attempt_prefers_highest_score() {
        let attempts = vec![
            attempt("completed", Some(4), 0),
            attempt("completed", Some(8), 1),
            attempt("completed", Some(6), 2),
        ];
        assert_eq!(best_attempt(&attempts).unwrap().score, Some(8));
    }

    #[test]
    fn best_attempt_breaks_score_ties_by_recency() {
        let older = attempt("completed", Some(8), 0);
        let newer = attempt("completed", Some(8), 5);
        let newer_id = newer.id;
        let attempts = vec![older, newer];
        assert_eq!(best_attempt(&attempts).unwrap().id, newer_id);
    }

    #[test]
    fn best_attempt_ignores_open_attempts() {
        let attempts = vec![attempt("in_progress", None, 0)];
        assert!(best_attempt(&attempts).is_none());
    }

    #[test]
    fn deadline_check_applies_grace() {
        let now = Utc::now();
        let deadline = now - Duration::seconds(10);
        assert!(!is_past_deadline(Some(deadline), now, 30));
        assert!(is_past_deadline(Some(deadline), now, 5));
        assert!(!is_past_deadline(None, now, 0));
    }
}
