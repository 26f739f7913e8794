use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Exam family; decides the marking scheme and which historical curves apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "examcategory", rename_all = "snake_case")]
pub(crate) enum ExamCategory {
    Cat,
    Gate,
    JeeMain,
    JeeAdvanced,
    Neet,
}

impl ExamCategory {
    pub(crate) fn marks_per_correct(self) -> i32 {
        match self {
            Self::Cat => 5,
            Self::Gate | Self::JeeMain | Self::JeeAdvanced | Self::Neet => 4,
        }
    }

    pub(crate) fn negative_marks_per_wrong(self) -> i32 {
        match self {
            Self::Cat | Self::Gate | Self::JeeMain | Self::JeeAdvanced | Self::Neet => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    SingleChoice,
    Puzzle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "difficultylevel", rename_all = "lowercase")]
pub(crate) enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "finalizejobstatus", rename_all = "lowercase")]
pub(crate) enum FinalizeJobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::ExamCategory;

    #[test]
    fn marking_schemes_per_category() {
        assert_eq!(ExamCategory::Cat.marks_per_correct(), 5);
        assert_eq!(ExamCategory::Cat.negative_marks_per_wrong(), 1);
        for category in [
            ExamCategory::Gate,
            ExamCategory::JeeMain,
            ExamCategory::JeeAdvanced,
            ExamCategory::Neet,
        ] {
            assert_eq!(category.marks_per_correct(), 4);
            assert_eq!(category.negative_marks_per_wrong(), 1);
        }
    }

    #[test]
    fn categories_serialize_snake_case() {
        let value = serde_json::to_value(ExamCategory::JeeAdvanced).expect("serialize");
        assert_eq!(value, "jee_advanced");
    }
}
