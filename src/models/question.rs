// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub quiz_id: i64,

    /// Question type: 'multiple_choice' (auto-gradable) or 'short_answer'
    /// (stored for manual review, never auto-graded).
    pub question_type: String,

    /// The text content of the question.
    pub prompt: String,

    /// Points awarded for a correct answer; always counted in the maximum
    /// score of the quiz.
    pub points: i64,

    /// Options with their correct flags (e.g., [{"id":1,"text":"A","correct":true}]).
    /// Stored as a JSON array in the database; empty for short answers.
    pub options: Json<Vec<QuestionOption>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub text: String,
    pub correct: bool,
}

/// Option DTO for students: the correct flag never leaves the server.
#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}

/// DTO for sending a question to the client (excludes answer keys).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub prompt: String,
    pub points: i64,
    pub options: Vec<PublicOption>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            prompt: q.prompt,
            points: q.points,
            options: q
                .options
                .0
                .into_iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text,
                })
                .collect(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 20))]
    pub question_type: String,
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[validate(range(min = 1, max = 100))]
    pub points: i64,
    #[validate(custom(function = validate_options))]
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    Ok(())
}
