use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, macros::format_description};
use time::{OffsetDateTime, PrimitiveDateTime};
use validator::Validate;

use crate::core::time::{format_primitive, to_primitive_utc};
use crate::db::models::Exam;
use crate::db::types::ExamCategory;
use crate::services::exams::{ExamChanges, NewExam};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    pub(crate) category: ExamCategory,
    #[validate(range(min = 1900, max = 9999, message = "year is out of range"))]
    pub(crate) year: i32,
    #[serde(alias = "startTime", deserialize_with = "deserialize_utc_datetime")]
    pub(crate) start_time: PrimitiveDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_utc_datetime")]
    pub(crate) end_time: PrimitiveDateTime,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default, alias = "maxMarks")]
    #[validate(range(min = 0, message = "max_marks must be non-negative"))]
    pub(crate) max_marks: i32,
    #[serde(default, alias = "topicIds")]
    pub(crate) topic_ids: Vec<String>,
    #[serde(default, alias = "questionIds")]
    pub(crate) question_ids: Vec<String>,
}

impl ExamCreate {
    pub(crate) fn into_new_exam(self) -> NewExam {
        NewExam {
            title: self.title,
            category: self.category,
            year: self.year,
            duration_minutes: self.duration_minutes,
            max_marks: self.max_marks,
            start_time: self.start_time,
            end_time: self.end_time,
            topic_ids: self.topic_ids,
            question_ids: self.question_ids,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default, alias = "startTime", deserialize_with = "deserialize_option_utc_datetime")]
    pub(crate) start_time: Option<PrimitiveDateTime>,
    #[serde(default, alias = "endTime", deserialize_with = "deserialize_option_utc_datetime")]
    pub(crate) end_time: Option<PrimitiveDateTime>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "maxMarks")]
    #[validate(range(min = 0, message = "max_marks must be non-negative"))]
    pub(crate) max_marks: Option<i32>,
}

impl ExamUpdate {
    pub(crate) fn into_changes(self) -> ExamChanges {
        ExamChanges {
            title: self.title,
            duration_minutes: self.duration_minutes,
            max_marks: self.max_marks,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) max_marks: i32,
    pub(crate) marks_per_correct: i32,
    pub(crate) negative_marks_per_wrong: i32,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) closed: bool,
    pub(crate) closed_at: Option<String>,
    pub(crate) finalize_job_id: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam) -> Self {
        Self {
            marks_per_correct: exam.category.marks_per_correct(),
            negative_marks_per_wrong: exam.category.negative_marks_per_wrong(),
            id: exam.id,
            title: exam.title,
            category: exam.category,
            year: exam.year,
            duration_minutes: exam.duration_minutes,
            max_marks: exam.max_marks,
            start_time: format_primitive(exam.start_time),
            end_time: format_primitive(exam.end_time),
            closed: exam.closed,
            closed_at: exam.closed_at.map(format_primitive),
            finalize_job_id: exam.finalize_job_id,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
        }
    }
}

fn parse_utc_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(to_primitive_utc(value));
    }

    // Naive timestamps are taken as UTC.
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value);
    }
    PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
        .ok()
}

fn deserialize_utc_datetime<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_datetime(&raw).ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_option_utc_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_utc_datetime(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}
