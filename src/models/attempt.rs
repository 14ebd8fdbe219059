// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::lockdown::{AnswerPayload, SubmissionReason, Violation};

/// Represents the 'attempts' table in the database.
/// One row per (student, quiz) pair, enforced by a unique constraint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub score: i64,
    pub max_score: i64,
    pub reason: String,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for submitting a quiz attempt. Mirrors the scoring-service wire
/// contract; the violation log travels with the answers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    pub student_id: i64,
    pub quiz_id: i64,
    pub answers: Vec<AnswerPayload>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub reason: SubmissionReason,
}

/// Response for a stored attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub score: i64,
    pub max_score: i64,
    pub attempt_id: String,
}

/// Admin review row: one attempt with its violation tally.
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptReview {
    pub attempt_id: i64,
    pub username: String,
    pub score: i64,
    pub max_score: i64,
    pub reason: String,
    pub violation_count: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregated struct for displaying the leaderboard.
/// Represents a row joined from `users` and `attempts`.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: i64,
    pub max_score: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}
