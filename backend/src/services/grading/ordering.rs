// src/services/grading/ordering.rs

use crate::{
    error::AppError,
    models::{
        quiz::Quiz,
        shuffled_quiz_set::{AnswerRecord, SubmittedAnswer},
    },
    services::grading::malformed_options,
};

/// Grades ordering quizzes. Returns one record per quiz it was given.
pub trait OrderingEvaluator: Send + Sync {
    fn check_correctness(
        &self,
        quizzes: &[(&Quiz, Vec<String>)],
    ) -> Result<Vec<AnswerRecord>, AppError>;
}

/// Compares submitted keys with the authored key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyOrderEvaluator;

impl OrderingEvaluator for KeyOrderEvaluator {
    fn check_correctness(
        &self,
        quizzes: &[(&Quiz, Vec<String>)],
    ) -> Result<Vec<AnswerRecord>, AppError> {
        quizzes
            .iter()
            .map(|(quiz, submitted)| {
                let expected = correct_keys(quiz)?;
                let correctness: Vec<bool> = submitted
                    .iter()
                    .enumerate()
                    .map(|(i, key)| expected.get(i) == Some(key))
                    .collect();
                let accepted =
                    submitted.len() == expected.len() && correctness.iter().all(|c| *c);

                let mut record = AnswerRecord::new(quiz.external_id.clone(), quiz.kind);
                record.submitted_keys = submitted.clone();
                record.correct_keys = expected;
                record.correctness = correctness;
                record.is_accepted = accepted;
                record.is_all_correct = accepted;
                record.point = if accepted { quiz.award() } else { 0 };
                Ok(record)
            })
            .collect()
    }
}

pub(super) fn correct_keys(quiz: &Quiz) -> Result<Vec<String>, AppError> {
    Ok(quiz
        .decode_options()
        .map_err(|e| malformed_options(quiz, e))?
        .into_iter()
        .map(|o| o.key)
        .collect())
}

pub(super) fn grade(
    evaluator: &dyn OrderingEvaluator,
    quiz: &Quiz,
    answers: &[SubmittedAnswer],
) -> Result<AnswerRecord, AppError> {
    let keys: Vec<String> = answers
        .iter()
        .map(|a| match a {
            SubmittedAnswer::SubmittedKey(key) => Ok(key.clone()),
            _ => Err(AppError::InvalidArgument(
                "ORD quiz expects submitted key answers".to_string(),
            )),
        })
        .collect::<Result<_, _>>()?;

    evaluator
        .check_correctness(&[(quiz, keys)])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::Internal(format!(
                "ordering evaluator returned no result for quiz {}",
                quiz.external_id
            ))
        })
}
