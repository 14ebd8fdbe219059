// src/lockdown/submit.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::session::Answer;
use super::violation::Violation;

/// Why an attempt was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionReason {
    Manual,
    Timeout,
    AutoSubmitted,
}

impl SubmissionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timeout => "timeout",
            Self::AutoSubmitted => "auto-submitted",
        }
    }
}

/// One answer on the wire: exactly one of `option_id` / `text_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub question_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_response: Option<String>,
}

/// The single submit request sent to the scoring service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPayload {
    pub student_id: i64,
    pub quiz_id: i64,
    pub answers: Vec<AnswerPayload>,
    pub violations: Vec<Violation>,
    pub reason: SubmissionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub score: i64,
    pub max_score: i64,
    pub attempt_id: String,
}

/// Submission failure, split by whether a retry can succeed.
#[derive(Debug, Clone)]
pub enum SubmitError {
    /// Network or server failure; the session stays in `Submitting` and a
    /// manual retry re-invokes the coordinator.
    Retryable(String),
    /// The scoring service already holds an attempt for this student+quiz
    /// pair. Terminal; resubmitting cannot succeed.
    AlreadyAttempted(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Retryable(msg) => write!(f, "submission failed: {}", msg),
            SubmitError::AlreadyAttempted(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SubmitError {}

/// The external scoring service, one endpoint.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn submit_attempt(&self, payload: &AttemptPayload) -> Result<AttemptResult, SubmitError>;
}

/// HTTP implementation against the quiz backend
/// (`POST /api/quizzes/{id}/attempts`, bearer auth).
pub struct HttpScoringClient {
    base: Url,
    token: String,
    http: reqwest::Client,
}

impl HttpScoringClient {
    pub fn new(base: Url, token: impl Into<String>) -> Self {
        Self {
            base,
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn submit_attempt(&self, payload: &AttemptPayload) -> Result<AttemptResult, SubmitError> {
        let url = self
            .base
            .join(&format!("api/quizzes/{}/attempts", payload.quiz_id))
            .map_err(|e| SubmitError::Retryable(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<AttemptResult>()
                .await
                .map_err(|e| SubmitError::Retryable(e.to_string()));
        }

        // Error bodies are {"error": "..."}; fall back to the raw text.
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        if status == StatusCode::CONFLICT {
            Err(SubmitError::AlreadyAttempted(message))
        } else {
            Err(SubmitError::Retryable(format!("{}: {}", status, message)))
        }
    }
}

/// Serializes the final answer set plus the violation log into one
/// idempotent submit call.
///
/// The `submitted` latch is a client-side latency optimization; the server's
/// unique (student, quiz) index is the actual safety net.
pub struct SubmissionCoordinator {
    client: Arc<dyn ScoringClient>,
    student_id: i64,
    quiz_id: i64,
    result: Option<AttemptResult>,
}

impl SubmissionCoordinator {
    pub fn new(client: Arc<dyn ScoringClient>, student_id: i64, quiz_id: i64) -> Self {
        Self {
            client,
            student_id,
            quiz_id,
            result: None,
        }
    }

    pub fn submitted(&self) -> bool {
        self.result.is_some()
    }

    /// Send the attempt. Empty free-text answers are excluded; the full
    /// violation log always goes along. Calling again after a success
    /// returns the stored result without another request.
    pub async fn submit(
        &mut self,
        answers: &HashMap<i64, Answer>,
        violations: &[Violation],
        reason: SubmissionReason,
    ) -> Result<AttemptResult, SubmitError> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }

        let payload = AttemptPayload {
            student_id: self.student_id,
            quiz_id: self.quiz_id,
            answers: build_answers(answers),
            violations: violations.to_vec(),
            reason,
        };

        let result = self.client.submit_attempt(&payload).await?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

/// Flatten the answer map into wire payloads, dropping empty text responses
/// and ordering by question id for a stable request body.
fn build_answers(answers: &HashMap<i64, Answer>) -> Vec<AnswerPayload> {
    let mut payloads: Vec<AnswerPayload> = answers
        .iter()
        .filter_map(|(&question_id, answer)| match answer {
            Answer::Choice { option_id } => Some(AnswerPayload {
                question_id,
                option_id: Some(*option_id),
                text_response: None,
            }),
            Answer::Text { text } if text.trim().is_empty() => None,
            Answer::Text { text } => Some(AnswerPayload {
                question_id,
                option_id: None,
                text_response: Some(text.clone()),
            }),
        })
        .collect();
    payloads.sort_by_key(|a| a.question_id);
    payloads
}
