use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{HistoricalExamStats, Question, Topic, User, UserExamCategoryStats};
use crate::db::types::{DifficultyLevel, ExamCategory, QuestionType};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserCreate {
    #[validate(length(min = 1, max = 150, message = "username must be 1-150 characters"))]
    pub(crate) username: String,
    #[serde(default, alias = "fullName")]
    pub(crate) full_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            is_active: user.is_active,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TopicCreate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TopicResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) is_active: bool,
}

impl TopicResponse {
    pub(crate) fn from_db(topic: Topic) -> Self {
        Self { id: topic.id, title: topic.title, is_active: topic.is_active }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[serde(alias = "topicId")]
    #[validate(length(min = 1, message = "topic_id is required"))]
    pub(crate) topic_id: String,
    #[serde(alias = "questionType")]
    pub(crate) question_type: QuestionType,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default, alias = "correctChoice")]
    #[validate(range(min = 1, max = 4, message = "correct_choice must be between 1 and 4"))]
    pub(crate) correct_choice: Option<i16>,
    #[serde(default, alias = "correctPuzzleAnswer")]
    pub(crate) correct_puzzle_answer: Option<String>,
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

impl QuestionCreate {
    /// The answer key must match the question type.
    pub(crate) fn check_answer_key(&self) -> Result<(), String> {
        match self.question_type {
            QuestionType::SingleChoice if self.correct_choice.is_none() => {
                Err("correct_choice is required for single-choice questions".to_string())
            }
            QuestionType::Puzzle
                if self.correct_puzzle_answer.as_deref().map_or(true, |a| a.trim().is_empty()) =>
            {
                Err("correct_puzzle_answer is required for puzzle questions".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) topic_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) is_active: bool,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            topic_id: question.topic_id,
            question_type: question.question_type,
            difficulty: question.difficulty,
            is_active: question.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoricalStatsUpsert {
    #[serde(alias = "scoreToPercentile")]
    pub(crate) score_to_percentile: BTreeMap<String, f64>,
    #[serde(alias = "percentileToRank")]
    pub(crate) percentile_to_rank: BTreeMap<String, f64>,
}

impl HistoricalStatsUpsert {
    /// Curve keys travel as JSON object keys, so each one must parse as a number.
    pub(crate) fn check_curves(&self) -> Result<(), String> {
        let curves = [
            ("score_to_percentile", &self.score_to_percentile),
            ("percentile_to_rank", &self.percentile_to_rank),
        ];
        for (name, curve) in curves {
            if let Some(key) = curve.keys().find(|key| key.trim().parse::<f64>().is_err()) {
                return Err(format!("{name} has a non-numeric key: {key}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoricalStatsResponse {
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) score_to_percentile: BTreeMap<String, f64>,
    pub(crate) percentile_to_rank: BTreeMap<String, f64>,
}

impl HistoricalStatsResponse {
    pub(crate) fn from_db(stats: HistoricalExamStats) -> Self {
        Self {
            category: stats.category,
            year: stats.year,
            score_to_percentile: stats.score_to_percentile.0,
            percentile_to_rank: stats.percentile_to_rank.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryStatsResponse {
    pub(crate) category: ExamCategory,
    pub(crate) tests_taken: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) highest_score: Option<i32>,
}

impl CategoryStatsResponse {
    pub(crate) fn from_db(stats: UserExamCategoryStats) -> Self {
        Self {
            category: stats.category,
            tests_taken: stats.tests_taken,
            average_score: stats.average_score,
            highest_score: stats.highest_score,
        }
    }

    pub(crate) fn empty(category: ExamCategory) -> Self {
        Self { category, tests_taken: 0, average_score: None, highest_score: None }
    }
}
