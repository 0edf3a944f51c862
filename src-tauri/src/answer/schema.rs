//! Answer record types

use crate::perception::ExpressionScores;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The interview question an answer belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewContext {
    pub interview_id: String,
    pub question_index: usize,
    pub question: Option<String>,
}

impl InterviewContext {
    pub fn new(interview_id: impl Into<String>, question_index: usize) -> Self {
        Self {
            interview_id: interview_id.into(),
            question_index,
            question: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}

/// A saved answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: Uuid,
    pub interview_id: String,
    pub question_index: usize,
    pub question: Option<String>,

    /// The answer text exactly as typed
    pub answer: String,

    /// Expressions detected at the moment of saving, if any
    pub expressions: Option<ExpressionScores>,

    pub saved_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn new(
        context: &InterviewContext,
        answer: String,
        expressions: Option<ExpressionScores>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            interview_id: context.interview_id.clone(),
            question_index: context.question_index,
            question: context.question.clone(),
            answer,
            expressions,
            saved_at: Utc::now(),
        }
    }
}
