use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::quiz_question::QuizQuestion;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuestionOutcome {
    pub correct: bool,
    pub points_earned: i32,
    pub max_points: i32,
}

#[derive(Debug, Clone)]
pub struct GradeResult {
    pub score: i32,
    pub total_points: i32,
    pub percentage: f64,
    pub passed: bool,
    pub outcomes: HashMap<Uuid, QuestionOutcome>,
}

impl GradeResult {
    pub fn percentage_decimal(&self) -> Decimal {
        Decimal::from_f64(self.percentage).unwrap_or_else(|| Decimal::new(0, 0))
    }
}

pub struct GradingService;

impl GradingService {
    /// Grade a complete attempt. Exact string equality against the stored
    /// correct answer; an unanswered question earns nothing.
    pub fn grade(
        questions: &[QuizQuestion],
        answers: &HashMap<Uuid, String>,
        passing_score: Decimal,
    ) -> GradeResult {
        let mut score: i32 = 0;
        let mut total_points: i32 = 0;
        let mut outcomes = HashMap::with_capacity(questions.len());

        for q in questions {
            total_points += q.points;
            let correct = answers
                .get(&q.id)
                .map(|given| given == &q.correct_answer)
                .unwrap_or(false);
            let points_earned = if correct { q.points } else { 0 };
            score += points_earned;
            outcomes.insert(
                q.id,
                QuestionOutcome {
                    correct,
                    points_earned,
                    max_points: q.points,
                },
            );
        }

        let percentage = if total_points > 0 {
            (score as f64 / total_points as f64) * 100.0
        } else {
            0.0
        };
        let percentage_dec =
            Decimal::from_f64(percentage).unwrap_or_else(|| Decimal::new(0, 0));
        let passed = total_points > 0 && percentage_dec >= passing_score;

        GradeResult {
            score,
            total_points,
            percentage,
            passed,
            outcomes,
        }
    }
}
