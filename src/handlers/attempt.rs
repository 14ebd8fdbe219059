// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, types::Json as SqlJson};

use crate::{
    error::AppError,
    lockdown::AnswerPayload,
    models::{
        attempt::{AttemptResponse, AttemptReview, LeaderboardEntry, SubmitAttemptRequest},
        question::Question,
    },
    utils::{html::clean_html, jwt::Claims},
};

/// Stores a quiz attempt and computes its score.
///
/// This is the scoring-service endpoint the submission coordinator calls:
/// it receives all non-empty answers plus the accumulated violation log and
/// the submission reason, and enforces at-most-one attempt per
/// (student, quiz) pair. A repeated submit returns 409 with a
/// distinguishable "already attempted" error.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

    // The payload carries the attempt identity per the wire contract, but
    // the token is authoritative.
    if req.student_id != student_id {
        return Err(AppError::BadRequest(
            "studentId does not match the authenticated user".to_string(),
        ));
    }
    if req.quiz_id != quiz_id {
        return Err(AppError::BadRequest(
            "quizId does not match the request path".to_string(),
        ));
    }

    let quiz_exists = sqlx::query_scalar::<_, i64>("SELECT id FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    if quiz_exists.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    // Fast duplicate pre-check; the unique constraint below is the actual
    // guarantee under concurrent submits.
    let already = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM attempts WHERE student_id = $1 AND quiz_id = $2",
    )
    .bind(student_id)
    .bind(quiz_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    if already.is_some() {
        return Err(AppError::Conflict("Quiz already attempted".to_string()));
    }

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_type, prompt, points, options, created_at
        FROM questions
        WHERE quiz_id = $1
        ORDER BY id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch answer keys: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let (score, max_score) = score_attempt(&questions, &req.answers);

    // Free-text responses are stored for manual review and rendered later,
    // so they are sanitized on the way in.
    let answers: Vec<AnswerPayload> = req
        .answers
        .into_iter()
        .map(|mut answer| {
            if let Some(text) = answer.text_response.take() {
                answer.text_response = Some(clean_html(&text));
            }
            answer
        })
        .collect();

    let attempt_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO attempts (student_id, quiz_id, score, max_score, reason, answers, violations)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(quiz_id)
    .bind(score)
    .bind(max_score)
    .bind(req.reason.as_str())
    .bind(SqlJson(&answers))
    .bind(SqlJson(&req.violations))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint")
            || e.to_string().contains("23505")
            || e.to_string().contains("uq_attempts_student_quiz")
        {
            AppError::Conflict("Quiz already attempted".to_string())
        } else {
            tracing::error!("Failed to insert attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    tracing::info!(
        "stored attempt {} for student {} on quiz {} ({} violations, reason {})",
        attempt_id,
        student_id,
        quiz_id,
        req.violations.len(),
        req.reason.as_str()
    );

    Ok((
        StatusCode::CREATED,
        Json(AttemptResponse {
            score,
            max_score,
            attempt_id: attempt_id.to_string(),
        }),
    ))
}

/// Simple point summation over auto-gradable question types.
///
/// Every question contributes its points to the maximum; only a
/// multiple-choice answer whose selected option is marked correct scores.
fn score_attempt(questions: &[Question], answers: &[AnswerPayload]) -> (i64, i64) {
    let answer_map: HashMap<i64, &AnswerPayload> =
        answers.iter().map(|a| (a.question_id, a)).collect();

    let mut score = 0;
    let mut max_score = 0;

    for question in questions {
        max_score += question.points;
        if question.question_type != "multiple_choice" {
            continue;
        }
        let Some(answer) = answer_map.get(&question.id) else {
            continue;
        };
        let Some(option_id) = answer.option_id else {
            continue;
        };
        if question
            .options
            .0
            .iter()
            .any(|option| option.id == option_id && option.correct)
        {
            score += question.points;
        }
    }

    (score, max_score)
}

/// Admin review: attempts for one quiz with their violation tallies.
pub async fn list_attempts(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, AttemptReview>(
        r#"
        SELECT
            a.id AS attempt_id,
            u.username,
            a.score,
            a.max_score,
            a.reason,
            jsonb_array_length(a.violations)::BIGINT AS violation_count,
            a.submitted_at
        FROM attempts a
        JOIN users u ON a.student_id = u.id
        WHERE a.quiz_id = $1
        ORDER BY a.submitted_at DESC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Retrieves the top 5 scores for one quiz.
pub async fn get_leaderboard(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let leaderboard = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT u.username, a.score, a.max_score, a.submitted_at
        FROM attempts a
        JOIN users u ON a.student_id = u.id
        WHERE a.quiz_id = $1
        ORDER BY a.score DESC
        LIMIT 5
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(leaderboard))
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;

    use super::*;
    use crate::models::question::QuestionOption;

    fn question(id: i64, question_type: &str, points: i64, options: Vec<QuestionOption>) -> Question {
        Question {
            id,
            quiz_id: 1,
            question_type: question_type.to_string(),
            prompt: format!("Question {}", id),
            points,
            options: Json(options),
            created_at: None,
        }
    }

    fn option(id: i64, correct: bool) -> QuestionOption {
        QuestionOption {
            id,
            text: format!("Option {}", id),
            correct,
        }
    }

    fn choice(question_id: i64, option_id: i64) -> AnswerPayload {
        AnswerPayload {
            question_id,
            option_id: Some(option_id),
            text_response: None,
        }
    }

    #[test]
    fn scores_correct_and_incorrect_selections() {
        // q1 answered correctly (2 pts), q2 incorrectly (3 pts).
        let questions = vec![
            question(1, "multiple_choice", 2, vec![option(10, true), option(11, false)]),
            question(2, "multiple_choice", 3, vec![option(20, true), option(21, false)]),
        ];
        let answers = vec![choice(1, 10), choice(2, 21)];

        let (score, max_score) = score_attempt(&questions, &answers);
        assert_eq!(score, 2);
        assert_eq!(max_score, 5);
    }

    #[test]
    fn unanswered_questions_still_count_toward_max() {
        let questions = vec![
            question(1, "multiple_choice", 2, vec![option(10, true)]),
            question(2, "multiple_choice", 3, vec![option(20, true)]),
        ];

        let (score, max_score) = score_attempt(&questions, &[]);
        assert_eq!(score, 0);
        assert_eq!(max_score, 5);
    }

    #[test]
    fn short_answers_are_never_auto_graded() {
        let questions = vec![question(1, "short_answer", 4, vec![])];
        let answers = vec![AnswerPayload {
            question_id: 1,
            option_id: None,
            text_response: Some("an essay".to_string()),
        }];

        let (score, max_score) = score_attempt(&questions, &answers);
        assert_eq!(score, 0);
        assert_eq!(max_score, 4);
    }

    #[test]
    fn answers_for_unknown_questions_are_ignored() {
        let questions = vec![question(1, "multiple_choice", 2, vec![option(10, true)])];
        let answers = vec![choice(99, 10)];

        let (score, max_score) = score_attempt(&questions, &answers);
        assert_eq!(score, 0);
        assert_eq!(max_score, 2);
    }
}
