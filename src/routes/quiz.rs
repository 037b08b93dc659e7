use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::quiz_dto::{
    AttemptHistoryResponse, AttemptSummary, PublicQuestion, QuestionsResponse, QuizInfo,
    SaveAnswersRequest, SaveAnswersResponse, StartAttemptResponse, SubmitAttemptRequest,
    SubmitAttemptResponse,
};
use crate::middleware::auth::CallerIdentity;
use crate::models::course::Course;
use crate::models::quiz::Quiz;
use crate::services::attempt_service;
use crate::services::course_service::CourseAccess;
use crate::AppState;

async fn resolve_quiz(
    state: &AppState,
    identity: &CallerIdentity,
    slug: &str,
    quiz_id: Uuid,
) -> crate::error::Result<(Course, Quiz, CourseAccess)> {
    let user = identity.require()?;
    let course = state.course_service.get_course_by_slug(slug).await?;
    let access = state.course_service.ensure_course_access(&course, user).await?;
    let quiz = state.quiz_service.get_quiz_for_course(quiz_id, course.id).await?;
    Ok((course, quiz, access))
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path((slug, quiz_id)): Path<(String, Uuid)>,
) -> crate::error::Result<Response> {
    let (course, quiz, access) = resolve_quiz(&state, &identity, &slug, quiz_id).await?;
    let user = identity.require()?;

    let attempt = state.attempt_service.start_attempt(user.id, &quiz).await?;
    if access == CourseAccess::Enrolled {
        state.course_service.touch_enrollment(user.id, course.id).await;
    }

    let used = state.attempt_service.count_attempts(user.id, quiz.id).await?;
    let resp = StartAttemptResponse {
        attempt: AttemptSummary::from(&attempt),
        attempts_remaining: attempt_service::attempts_remaining(quiz.max_attempts, used),
    };
    Ok(Json(resp).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt_history(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path((slug, quiz_id)): Path<(String, Uuid)>,
) -> crate::error::Result<Response> {
    let (_course, quiz, _access) = resolve_quiz(&state, &identity, &slug, quiz_id).await?;
    let user = identity.require()?;

    let attempts = state.attempt_service.list_attempts(user.id, quiz.id).await?;
    let question_count = state.quiz_service.question_count(quiz.id).await?;

    let best = attempt_service::best_attempt(&attempts).map(AttemptSummary::from);
    let resp = AttemptHistoryResponse {
        attempts_remaining: attempt_service::attempts_remaining(
            quiz.max_attempts,
            attempts.len() as i64,
        ),
        attempts: attempts.iter().map(AttemptSummary::from).collect(),
        best_attempt: best,
        quiz: QuizInfo { question_count },
    };
    Ok(Json(resp).into_response())
}

#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path((slug, quiz_id)): Path<(String, Uuid)>,
) -> crate::error::Result<Response> {
    let (_course, quiz, _access) = resolve_quiz(&state, &identity, &slug, quiz_id).await?;

    let questions = state.quiz_service.list_questions(quiz.id).await?;
    let resp = QuestionsResponse {
        questions: questions.iter().map(PublicQuestion::from).collect(),
    };
    Ok(Json(resp).into_response())
}

#[axum::debug_handler]
pub async fn save_answers(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path((slug, quiz_id, attempt_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<SaveAnswersRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    if req.answers.is_empty() {
        return Err(crate::error::Error::BadRequest(
            "answers must not be empty".to_string(),
        ));
    }
    let (_course, quiz, _access) = resolve_quiz(&state, &identity, &slug, quiz_id).await?;
    let user = identity.require()?;

    // Scope the attempt id to this quiz before writing anything.
    state
        .attempt_service
        .get_attempt(attempt_id, user.id, quiz.id)
        .await?;
    let updated = state
        .attempt_service
        .save_answers(attempt_id, user.id, &req.answers)
        .await?;

    Ok(Json(SaveAnswersResponse {
        saved: true,
        answered: updated.answer_map().len(),
        timestamp: chrono::Utc::now(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path((slug, quiz_id, attempt_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<SubmitAttemptRequest>,
) -> crate::error::Result<Response> {
    let (_course, quiz, _access) = resolve_quiz(&state, &identity, &slug, quiz_id).await?;
    let user = identity.require()?;

    let attempt = state
        .attempt_service
        .get_attempt(attempt_id, user.id, quiz.id)
        .await?;
    let questions = state.quiz_service.list_questions(quiz.id).await?;

    let grace = crate::config::get_config().submit_grace_seconds;
    let (updated, grade) = state
        .attempt_service
        .submit_attempt(&attempt, &quiz, &questions, &req.answers, grace)
        .await?;

    let _ = state
        .audit_service
        .log(
            Some(user.id),
            "submit_attempt",
            "quiz_attempt",
            updated.id,
            Some(json!({
                "score": grade.score,
                "total_points": grade.total_points,
                "passed": grade.passed,
            })),
        )
        .await;

    let resp = SubmitAttemptResponse {
        attempt: AttemptSummary::from(&updated),
        percentage: grade.percentage,
        results: grade.outcomes,
    };
    Ok(Json(resp).into_response())
}
