//! Per-attempt scoring and the rolling per-user aggregates it feeds.

use std::collections::BTreeMap;

use crate::db::models::SubjectScores;
use crate::db::types::{ExamCategory, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Marking {
    pub(crate) per_correct: i32,
    pub(crate) per_wrong: i32,
}

impl Marking {
    pub(crate) fn for_category(category: ExamCategory) -> Self {
        Self {
            per_correct: category.marks_per_correct(),
            per_wrong: category.negative_marks_per_wrong(),
        }
    }
}

/// Answer key of a question as far as grading is concerned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AnswerKey<'a> {
    pub(crate) question_type: QuestionType,
    pub(crate) correct_choice: Option<i16>,
    pub(crate) correct_puzzle_answer: Option<&'a str>,
}

/// `None` means nothing gradable was submitted.
pub(crate) fn grade(
    key: &AnswerKey<'_>,
    selected_choice: Option<i16>,
    input_answer: Option<&str>,
) -> Option<bool> {
    match key.question_type {
        QuestionType::SingleChoice => {
            selected_choice.map(|choice| key.correct_choice == Some(choice))
        }
        QuestionType::Puzzle => {
            let input = input_answer?;
            let expected = key.correct_puzzle_answer.unwrap_or_default();
            Some(normalize_free_text(input) == normalize_free_text(expected))
        }
    }
}

fn normalize_free_text(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub(crate) struct GradedAnswer {
    pub(crate) topic_id: String,
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TopicTally {
    pub(crate) correct: i32,
    pub(crate) incorrect: i32,
}

impl TopicTally {
    pub(crate) fn attempted(&self) -> i32 {
        self.correct + self.incorrect
    }

    pub(crate) fn score(&self, marking: Marking) -> i32 {
        self.correct * marking.per_correct - self.incorrect * marking.per_wrong
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttemptScore {
    pub(crate) tallies: BTreeMap<String, TopicTally>,
    pub(crate) subject_scores: SubjectScores,
    pub(crate) total_score: i32,
}

/// Tallies completed answers per topic. Ungraded answers are skipped.
pub(crate) fn score_answers<'a, I>(answers: I, marking: Marking) -> AttemptScore
where
    I: IntoIterator<Item = &'a GradedAnswer>,
{
    let mut tallies: BTreeMap<String, TopicTally> = BTreeMap::new();
    for answer in answers {
        let Some(is_correct) = answer.is_correct else {
            continue;
        };
        let tally = tallies.entry(answer.topic_id.clone()).or_default();
        if is_correct {
            tally.correct += 1;
        } else {
            tally.incorrect += 1;
        }
    }

    let subject_scores: SubjectScores =
        tallies.iter().map(|(topic, tally)| (topic.clone(), tally.score(marking))).collect();
    let total_score = subject_scores.values().sum();

    AttemptScore { tallies, subject_scores, total_score }
}

/// Running per-category aggregate of a single user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CategoryAggregate {
    pub(crate) tests_taken: i32,
    pub(crate) average_score: Option<f64>,
    pub(crate) highest_score: Option<i32>,
}

impl CategoryAggregate {
    pub(crate) fn record(&self, total_score: i32) -> Self {
        let tests_taken = self.tests_taken + 1;
        let previous_sum = self.average_score.unwrap_or(0.0) * f64::from(self.tests_taken);
        let average_score = (previous_sum + f64::from(total_score)) / f64::from(tests_taken);
        let highest_score = match self.highest_score {
            Some(best) => best.max(total_score),
            None => total_score,
        };

        Self { tests_taken, average_score: Some(average_score), highest_score: Some(highest_score) }
    }
}
