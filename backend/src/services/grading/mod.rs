// src/services/grading/mod.rs

//! Answer grading. Each quiz kind maps to one strategy; kinds without a
//! strategy are refused instead of falling through to a default.

mod fill_in_blank;
mod ordering;
mod selection;

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        quiz::{Quiz, QuizKind},
        shuffled_quiz_set::{AnswerRecord, Seed, SubmittedAnswer},
    },
};

pub use ordering::{KeyOrderEvaluator, OrderingEvaluator};

/// How a quiz kind is graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Selection,
    FillInBlank,
    Ordering,
}

/// Grading strategy table.
pub fn strategy_for(kind: QuizKind) -> Option<Strategy> {
    match kind {
        QuizKind::Mcq | QuizKind::Maq | QuizKind::Miq => Some(Strategy::Selection),
        QuizKind::Fib | QuizKind::Pow | QuizKind::Tad => Some(Strategy::FillInBlank),
        QuizKind::Ord => Some(Strategy::Ordering),
        QuizKind::Esq => None,
    }
}

/// Correct answers of a quiz as the student would see them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey {
    pub correct_index: Vec<u32>,
    pub correct_text: Vec<String>,
    pub correct_keys: Vec<String>,
}

/// Partial credit accepts any correct sub-answer; otherwise all `required`
/// sub-answers have to be given and right.
pub(crate) fn is_accepted(partial_credit: bool, correctness: &[bool], required: usize) -> bool {
    if partial_credit {
        correctness.iter().any(|c| *c)
    } else {
        correctness.len() == required && correctness.iter().all(|c| *c)
    }
}

#[derive(Clone)]
pub struct Grader {
    ordering: Arc<dyn OrderingEvaluator>,
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(Arc::new(KeyOrderEvaluator))
    }
}

impl Grader {
    pub fn new(ordering: Arc<dyn OrderingEvaluator>) -> Self {
        Self { ordering }
    }

    /// Grades `answers` for the quiz at `position` of an attempt keyed by `seed`.
    pub fn grade(
        &self,
        quiz: &Quiz,
        seed: Seed,
        position: i64,
        answers: &[SubmittedAnswer],
    ) -> Result<AnswerRecord, AppError> {
        let strategy = strategy_for(quiz.kind).ok_or_else(unsupported)?;

        let record = match strategy {
            Strategy::Selection => selection::grade(quiz, seed, position, answers)?,
            Strategy::FillInBlank => fill_in_blank::grade(quiz, answers)?,
            Strategy::Ordering => ordering::grade(self.ordering.as_ref(), quiz, answers)?,
        };

        tracing::debug!(
            quiz_id = %quiz.external_id,
            kind = %quiz.kind,
            accepted = record.is_accepted,
            "graded answer"
        );
        Ok(record)
    }

    /// Answer key of an unanswered quiz, aligned with its display order.
    /// Kinds without a strategy have an empty key.
    pub fn answer_key(&self, quiz: &Quiz, seed: Seed, position: i64) -> Result<AnswerKey, AppError> {
        match strategy_for(quiz.kind) {
            Some(Strategy::Selection) => Ok(AnswerKey {
                correct_index: selection::correct_index(quiz, seed, position)?,
                ..AnswerKey::default()
            }),
            Some(Strategy::FillInBlank) => Ok(AnswerKey {
                correct_text: fill_in_blank::correct_text(quiz)?,
                ..AnswerKey::default()
            }),
            Some(Strategy::Ordering) => Ok(AnswerKey {
                correct_keys: ordering::correct_keys(quiz)?,
                ..AnswerKey::default()
            }),
            None => Ok(AnswerKey::default()),
        }
    }
}

fn unsupported() -> AppError {
    AppError::FailedPrecondition("quiz type is not supported".to_string())
}

pub(crate) fn malformed_options(quiz: &Quiz, err: serde_json::Error) -> AppError {
    AppError::Internal(format!(
        "quiz {} has malformed options: {}",
        quiz.external_id, err
    ))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_table_covers_every_gradable_kind() {
        assert_eq!(strategy_for(QuizKind::Miq), Some(Strategy::Selection));
        assert_eq!(strategy_for(QuizKind::Tad), Some(Strategy::FillInBlank));
        assert_eq!(strategy_for(QuizKind::Ord), Some(Strategy::Ordering));
        assert_eq!(strategy_for(QuizKind::Esq), None);
    }

    #[test]
    fn essay_is_refused() {
        let quiz = quiz(QuizKind::Esq, json!([]));
        let err = Grader::default()
            .grade(&quiz, Seed::new(1), 1, &[SubmittedAnswer::FilledText("x".into())])
            .unwrap_err();
        match err {
            AppError::FailedPrecondition(msg) => assert_eq!(msg, "quiz type is not supported"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn acceptance_rule() {
        assert!(is_accepted(true, &[false, true], 3));
        assert!(!is_accepted(true, &[false, false], 2));
        assert!(is_accepted(false, &[true, true], 2));
        assert!(!is_accepted(false, &[true, false], 2));
        assert!(!is_accepted(false, &[true], 2));
    }

    #[test]
    fn answer_key_for_fill_in_blank() {
        let quiz = quiz(
            QuizKind::Fib,
            json!([option(" cat ", true), option("dog", true)]),
        );
        let key = Grader::default().answer_key(&quiz, Seed::new(3), 1).unwrap();
        assert_eq!(key.correct_text, vec!["cat", "dog"]);
        assert!(key.correct_index.is_empty());
    }
}
