use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{DifficultyLevel, ExamCategory, FinalizeJobStatus, QuestionType};

/// Topic id keyed maps stored as JSONB on the attempt row.
pub(crate) type SubjectScores = BTreeMap<String, i32>;
pub(crate) type SubjectPercentiles = BTreeMap<String, f64>;
pub(crate) type SubjectRanks = BTreeMap<String, i32>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Topic {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) topic_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_choice: Option<i16>,
    pub(crate) correct_puzzle_answer: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) max_marks: i32,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) closed: bool,
    pub(crate) closed_at: Option<PrimitiveDateTime>,
    pub(crate) finalize_job_id: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) total_score: Option<i32>,
    pub(crate) overall_rank: Option<i32>,
    pub(crate) overall_percentile: Option<f64>,
    pub(crate) subject_scores: Json<SubjectScores>,
    pub(crate) subject_percentiles: Json<SubjectPercentiles>,
    pub(crate) subject_ranks: Json<SubjectRanks>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AnsweredQuestion {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_puzzle_answer: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct UserExamCategoryStats {
    pub(crate) user_id: String,
    pub(crate) category: ExamCategory,
    pub(crate) tests_taken: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) highest_score: Option<i32>,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct UserTopicStats {
    pub(crate) user_id: String,
    pub(crate) topic_id: String,
    pub(crate) questions_attempted: i32,
    pub(crate) correct_answers: i32,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl UserTopicStats {
    pub(crate) fn accuracy(&self) -> f64 {
        if self.questions_attempted > 0 && self.correct_answers > 0 {
            return f64::from(self.correct_answers) / f64::from(self.questions_attempted) * 100.0;
        }
        0.0
    }
}

/// Prior-year cohort curves; keys are JSON object keys so they arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct HistoricalExamStats {
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) score_to_percentile: Json<BTreeMap<String, f64>>,
    pub(crate) percentile_to_rank: Json<BTreeMap<String, f64>>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalizeJob {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) run_at: PrimitiveDateTime,
    pub(crate) status: FinalizeJobStatus,
    pub(crate) attempts: i32,
    pub(crate) last_error: Option<String>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
