// src/services/grading/fill_in_blank.rs

use crate::{
    error::AppError,
    models::{
        quiz::{Blank, Quiz},
        shuffled_quiz_set::{AnswerRecord, SubmittedAnswer},
    },
    services::grading::{is_accepted, malformed_options},
};

fn blanks(quiz: &Quiz) -> Result<Vec<Blank>, AppError> {
    quiz.blanks().map_err(|e| malformed_options(quiz, e))
}

pub(super) fn correct_text(quiz: &Quiz) -> Result<Vec<String>, AppError> {
    Ok(blanks(quiz)?.iter().map(Blank::canonical_text).collect())
}

/// Blanks are compared position by position on trimmed, case-sensitive text.
pub(super) fn grade(quiz: &Quiz, answers: &[SubmittedAnswer]) -> Result<AnswerRecord, AppError> {
    let filled: Vec<String> = answers
        .iter()
        .map(|a| match a {
            SubmittedAnswer::FilledText(text) => Ok(text.clone()),
            _ => Err(AppError::InvalidArgument(format!(
                "{} quiz expects filled text answers",
                quiz.kind
            ))),
        })
        .collect::<Result<_, _>>()?;

    let blanks = blanks(quiz)?;
    if filled.len() > blanks.len() {
        return Err(AppError::InvalidArgument(format!(
            "{} answers submitted for {} blanks",
            filled.len(),
            blanks.len()
        )));
    }

    let correctness: Vec<bool> = filled
        .iter()
        .zip(&blanks)
        .map(|(text, blank)| blank.accepts(text))
        .collect();

    let partial_credit = blanks.first().is_some_and(Blank::has_partial_credit);
    let accepted = is_accepted(partial_credit, &correctness, blanks.len());

    let mut record = AnswerRecord::new(quiz.external_id.clone(), quiz.kind);
    record.is_all_correct = filled.len() == blanks.len() && correctness.iter().all(|c| *c);
    record.filled_text = filled;
    record.correct_text = blanks.iter().map(Blank::canonical_text).collect();
    record.correctness = correctness;
    record.is_accepted = accepted;
    record.point = if accepted { quiz.award() } else { 0 };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizKind;
    use crate::services::grading::fixtures::quiz;
    use serde_json::json;

    fn text(answers: &[&str]) -> Vec<SubmittedAnswer> {
        answers
            .iter()
            .map(|a| SubmittedAnswer::FilledText(a.to_string()))
            .collect()
    }

    #[test]
    fn trims_and_accepts_alternatives() {
        let quiz = quiz(
            QuizKind::Fib,
            json!([
                {"content": {"raw": "colour"}, "label": "1"},
                {"content": {"raw": "color"}, "label": "1"},
                {"content": {"raw": "grey"}, "label": "2"}
            ]),
        );

        let record = grade(&quiz, &text(&["  color ", "grey"])).unwrap();
        assert_eq!(record.correctness, vec![true, true]);
        assert!(record.is_accepted);
        assert!(record.is_all_correct);
        assert_eq!(record.correct_text, vec!["colour", "grey"]);
        assert_eq!(record.point, 5);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let quiz = quiz(QuizKind::Pow, json!([{"content": {"raw": "Paris"}}]));
        let record = grade(&quiz, &text(&["paris"])).unwrap();
        assert!(!record.is_accepted);
        assert_eq!(record.point, 0);
    }

    #[test]
    fn partial_credit_accepts_one_blank() {
        let quiz = quiz(
            QuizKind::Fib,
            json!([
                {"content": {"raw": "one"}, "configs": ["QUIZ_OPTION_CONFIG_PARTIAL_CREDIT"]},
                {"content": {"raw": "two"}},
                {"content": {"raw": "three"}}
            ]),
        );
        let record = grade(&quiz, &text(&["one", "x", "y"])).unwrap();
        assert_eq!(record.correctness, vec![true, false, false]);
        assert!(record.is_accepted);
        assert!(!record.is_all_correct);
    }

    #[test]
    fn without_partial_credit_one_miss_rejects() {
        let quiz = quiz(
            QuizKind::Tad,
            json!([{"content": {"raw": "one"}}, {"content": {"raw": "two"}}]),
        );
        let record = grade(&quiz, &text(&["one", "three"])).unwrap();
        assert!(!record.is_accepted);
    }

    #[test]
    fn leaving_blanks_empty_rejects() {
        let quiz = quiz(
            QuizKind::Fib,
            json!([{"content": {"raw": "one"}}, {"content": {"raw": "two"}}]),
        );
        let record = grade(&quiz, &text(&["one"])).unwrap();
        assert_eq!(record.correctness, vec![true]);
        assert!(!record.is_accepted);
        assert_eq!(record.point, 0);
    }

    #[test]
    fn rejects_wrong_shape_and_overflow() {
        let quiz = quiz(QuizKind::Fib, json!([{"content": {"raw": "one"}}]));
        assert!(matches!(
            grade(&quiz, &[SubmittedAnswer::SelectedIndex(1)]),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            grade(&quiz, &text(&["one", "two"])),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
