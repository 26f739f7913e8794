use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{
    AnsweredQuestion, Attempt, SubjectPercentiles, SubjectRanks, SubjectScores, UserTopicStats,
};
use crate::db::types::QuestionType;
use crate::repositories::answers::AnswerDetailRow;
use crate::services::attempts::{AnswerSelection, AttemptDetail};

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<String>,
    pub(crate) total_score: Option<i32>,
    pub(crate) overall_rank: Option<i32>,
    pub(crate) overall_percentile: Option<f64>,
    pub(crate) subject_scores: SubjectScores,
    pub(crate) subject_percentiles: SubjectPercentiles,
    pub(crate) subject_ranks: SubjectRanks,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            user_id: attempt.user_id,
            start_time: format_primitive(attempt.start_time),
            end_time: format_primitive(attempt.end_time),
            completed: attempt.completed,
            completed_at: attempt.completed_at.map(format_primitive),
            total_score: attempt.total_score,
            overall_rank: attempt.overall_rank,
            overall_percentile: attempt.overall_percentile,
            subject_scores: attempt.subject_scores.0,
            subject_percentiles: attempt.subject_percentiles.0,
            subject_ranks: attempt.subject_ranks.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerDetailResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) topic_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_puzzle_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<String>,
}

impl AnswerDetailResponse {
    /// Correctness stays hidden until the whole attempt is submitted.
    fn from_row(row: AnswerDetailRow, reveal: bool) -> Self {
        Self {
            id: row.id,
            question_id: row.question_id,
            topic_id: row.topic_id,
            question_type: row.question_type,
            selected_choice: row.selected_choice,
            input_puzzle_answer: row.input_puzzle_answer,
            is_correct: if reveal { row.is_correct } else { None },
            completed: row.completed,
            completed_at: row.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    #[serde(flatten)]
    pub(crate) attempt: AttemptResponse,
    pub(crate) answers: Vec<AnswerDetailResponse>,
}

impl AttemptDetailResponse {
    pub(crate) fn from_detail(detail: AttemptDetail) -> Self {
        let reveal = detail.attempt.completed;
        Self {
            attempt: AttemptResponse::from_db(detail.attempt),
            answers: detail
                .answers
                .into_iter()
                .map(|row| AnswerDetailResponse::from_row(row, reveal))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnswerSubmit {
    #[serde(default, alias = "selectedChoice")]
    pub(crate) selected_choice: Option<i16>,
    #[serde(default, alias = "input_puzzle_answer", alias = "inputPuzzleAnswer")]
    pub(crate) answer_text: Option<String>,
}

impl AnswerSubmit {
    pub(crate) fn into_selection(self) -> AnswerSelection {
        AnswerSelection { selected_choice: self.selected_choice, input_answer: self.answer_text }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_puzzle_answer: Option<String>,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<String>,
}

impl AnswerResponse {
    pub(crate) fn from_db(answer: AnsweredQuestion) -> Self {
        Self {
            id: answer.id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            selected_choice: answer.selected_choice,
            input_puzzle_answer: answer.input_puzzle_answer,
            completed: answer.completed,
            completed_at: answer.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TopicStatsResponse {
    pub(crate) topic_id: String,
    pub(crate) questions_attempted: i32,
    pub(crate) correct_answers: i32,
    pub(crate) accuracy: f64,
}

impl TopicStatsResponse {
    pub(crate) fn from_db(stats: UserTopicStats) -> Self {
        Self {
            accuracy: stats.accuracy(),
            topic_id: stats.topic_id,
            questions_attempted: stats.questions_attempted,
            correct_answers: stats.correct_answers,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn row(is_correct: Option<bool>) -> AnswerDetailRow {
        AnswerDetailRow {
            id: "answer-1".to_string(),
            question_id: "question-1".to_string(),
            topic_id: "topic-1".to_string(),
            question_type: QuestionType::SingleChoice,
            selected_choice: Some(2),
            input_puzzle_answer: None,
            is_correct,
            completed: true,
            completed_at: Some(datetime!(2026-03-01 10:00)),
        }
    }

    #[test]
    fn correctness_is_hidden_until_completion() {
        let hidden = serde_json::to_value(AnswerDetailResponse::from_row(row(Some(true)), false))
            .expect("serialize");
        assert!(hidden.get("is_correct").is_none());

        let shown = serde_json::to_value(AnswerDetailResponse::from_row(row(Some(true)), true))
            .expect("serialize");
        assert_eq!(shown["is_correct"], true);
    }

    #[test]
    fn puzzle_text_accepts_legacy_field_name() {
        let payload: AnswerSubmit =
            serde_json::from_value(serde_json::json!({ "input_puzzle_answer": " Paris " }))
                .expect("payload");
        let selection = payload.into_selection();
        assert_eq!(selection.input_answer.as_deref(), Some(" Paris "));
        assert_eq!(selection.selected_choice, None);
    }
}
