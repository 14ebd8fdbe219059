// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    pub description: Option<String>,

    /// Countdown length for one attempt.
    pub duration_seconds: i64,

    /// Whether attempts at this quiz run inside the restricted window with
    /// the escalation machine active.
    pub lockdown_enabled: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Quiz detail sent to a student: metadata plus answer-stripped questions.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<crate::models::question::PublicQuestion>,
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 30, max = 14400))]
    pub duration_seconds: i64,
    #[serde(default)]
    pub lockdown_enabled: bool,
}
