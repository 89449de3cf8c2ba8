// src/services/grading/selection.rs

use crate::{
    error::AppError,
    models::{
        quiz::{Quiz, QuizOption},
        shuffled_quiz_set::{AnswerRecord, Seed, SubmittedAnswer},
    },
    services::{
        grading::{is_accepted, malformed_options},
        shuffle,
    },
};

/// Options in the order the student saw them.
fn displayed_options(quiz: &Quiz, seed: Seed, position: i64) -> Result<Vec<QuizOption>, AppError> {
    shuffle::displayed_options(quiz, seed, position).map_err(|e| malformed_options(quiz, e))
}

fn correct_positions(options: &[QuizOption]) -> Vec<u32> {
    options
        .iter()
        .enumerate()
        .filter(|(_, o)| o.correctness)
        .map(|(i, _)| i as u32 + 1)
        .collect()
}

pub(super) fn correct_index(quiz: &Quiz, seed: Seed, position: i64) -> Result<Vec<u32>, AppError> {
    Ok(correct_positions(&displayed_options(quiz, seed, position)?))
}

/// Partial credit is on when any option of the quiz carries the flag,
/// whether or not that option was selected.
pub(super) fn grade(
    quiz: &Quiz,
    seed: Seed,
    position: i64,
    answers: &[SubmittedAnswer],
) -> Result<AnswerRecord, AppError> {
    let selected: Vec<u32> = answers
        .iter()
        .map(|a| match a {
            SubmittedAnswer::SelectedIndex(i) => Ok(*i),
            _ => Err(AppError::InvalidArgument(format!(
                "{} quiz expects selected index answers",
                quiz.kind
            ))),
        })
        .collect::<Result<_, _>>()?;

    let options = displayed_options(quiz, seed, position)?;
    if selected.len() > options.len() {
        return Err(AppError::InvalidArgument(format!(
            "{} answers submitted for {} options",
            selected.len(),
            options.len()
        )));
    }

    let correctness = selected
        .iter()
        .map(|&index| {
            let option = (index as usize)
                .checked_sub(1)
                .and_then(|i| options.get(i))
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!("selected index {} is out of range", index))
                })?;
            Ok(option.correctness)
        })
        .collect::<Result<Vec<bool>, AppError>>()?;

    let partial_credit = options.iter().any(QuizOption::has_partial_credit);
    let correct_index = correct_positions(&options);
    let accepted = is_accepted(partial_credit, &correctness, correct_index.len());

    let mut record = AnswerRecord::new(quiz.external_id.clone(), quiz.kind);
    record.is_all_correct = correctness.iter().all(|c| *c)
        && correct_index.iter().all(|i| selected.contains(i));
    record.selected_index = selected;
    record.correct_index = correct_index;
    record.correctness = correctness;
    record.is_accepted = accepted;
    record.point = if accepted { quiz.award() } else { 0 };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizKind;
    use crate::services::grading::fixtures::{option, quiz};
    use crate::utils::shuffle::shuffle_options;
    use serde_json::json;

    /// 1-based index of the correct option after the display shuffle.
    fn shown_correct(quiz: &Quiz, seed: Seed, position: i64) -> Vec<u32> {
        correct_index(quiz, seed, position).unwrap()
    }

    #[test]
    fn mcq_single_correct_selection_is_accepted() {
        let quiz = quiz(QuizKind::Mcq, json!([option("a", false), option("b", true)]));
        let seed = Seed::new(42);
        let correct = shown_correct(&quiz, seed, 1);
        assert_eq!(correct.len(), 1);

        let record = grade(&quiz, seed, 1, &[SubmittedAnswer::SelectedIndex(correct[0])]).unwrap();
        assert!(record.is_accepted);
        assert!(record.is_all_correct);
        assert_eq!(record.point, 5);
        assert_eq!(record.correct_index, correct);
    }

    #[test]
    fn mcq_with_a_wrong_selection_is_rejected() {
        let quiz = quiz(QuizKind::Mcq, json!([option("a", false), option("b", true)]));
        let record = grade(
            &quiz,
            Seed::new(42),
            1,
            &[SubmittedAnswer::SelectedIndex(1), SubmittedAnswer::SelectedIndex(2)],
        )
        .unwrap();
        assert!(!record.is_accepted);
        assert_eq!(record.point, 0);
        assert_eq!(record.correctness.iter().filter(|c| **c).count(), 1);
    }

    #[test]
    fn partial_credit_accepts_one_correct_selection() {
        let quiz = quiz(
            QuizKind::Maq,
            json!([
                {"content": {"raw": "a"}, "correctness": true, "configs": ["QUIZ_OPTION_CONFIG_PARTIAL_CREDIT"]},
                {"content": {"raw": "b"}, "correctness": true},
                {"content": {"raw": "c"}, "correctness": false}
            ]),
        );
        let seed = Seed::new(7);
        let correct = shown_correct(&quiz, seed, 2);
        let wrong = (1..=3).find(|i| !correct.contains(i)).unwrap();

        let record = grade(
            &quiz,
            seed,
            2,
            &[SubmittedAnswer::SelectedIndex(correct[0]), SubmittedAnswer::SelectedIndex(wrong)],
        )
        .unwrap();
        assert!(record.is_accepted);
        assert!(!record.is_all_correct);
    }

    #[test]
    fn partial_credit_flag_on_unselected_option_still_applies() {
        let quiz = quiz(
            QuizKind::Maq,
            json!([
                {"content": {"raw": "a"}, "correctness": true},
                {"content": {"raw": "b"}, "correctness": true},
                {"content": {"raw": "c"}, "correctness": false, "configs": ["QUIZ_OPTION_CONFIG_PARTIAL_CREDIT"]}
            ]),
        );
        let seed = Seed::new(3);
        let correct = shown_correct(&quiz, seed, 1);

        let record = grade(&quiz, seed, 1, &[SubmittedAnswer::SelectedIndex(correct[0])]).unwrap();
        assert!(record.is_accepted);
        assert!(!record.is_all_correct);
    }

    #[test]
    fn maq_needs_every_correct_option() {
        let quiz = quiz(
            QuizKind::Maq,
            json!([option("a", true), option("b", true), option("c", true), option("d", false)]),
        );
        let seed = Seed::new(11);
        let correct = shown_correct(&quiz, seed, 1);
        assert_eq!(correct.len(), 3);

        let one = grade(&quiz, seed, 1, &[SubmittedAnswer::SelectedIndex(correct[0])]).unwrap();
        assert!(!one.is_accepted);
        assert!(!one.is_all_correct);
        assert_eq!(one.point, 0);

        let all: Vec<_> = correct.iter().map(|i| SubmittedAnswer::SelectedIndex(*i)).collect();
        let record = grade(&quiz, seed, 1, &all).unwrap();
        assert!(record.is_accepted);
        assert_eq!(record.point, 5);
    }

    #[test]
    fn miq_is_never_shuffled() {
        let quiz = quiz(QuizKind::Miq, json!([option("true", true), option("false", false)]));
        for seed in 0..20 {
            assert_eq!(shown_correct(&quiz, Seed::new(seed), 1), vec![1]);
        }
    }

    #[test]
    fn regrading_matches_display_order() {
        let options: Vec<_> = (0..6).map(|i| option(&i.to_string(), i == 4)).collect();
        let quiz = quiz(QuizKind::Mcq, json!(options));
        let seed = Seed::new(1_700_000_000_000_000_000);
        let shown = shuffle_options(&quiz.decode_options().unwrap(), seed, 3);
        let index = shown.iter().position(|o| o.content.raw == "4").unwrap() as u32 + 1;

        let record = grade(&quiz, seed, 3, &[SubmittedAnswer::SelectedIndex(index)]).unwrap();
        assert!(record.is_accepted);
    }

    #[test]
    fn rejects_malformed_answers() {
        let quiz = quiz(QuizKind::Mcq, json!([option("a", false), option("b", true)]));
        let seed = Seed::new(1);

        let wrong_shape = grade(&quiz, seed, 1, &[SubmittedAnswer::FilledText("a".into())]);
        assert!(matches!(wrong_shape, Err(AppError::InvalidArgument(_))));

        let too_many = grade(
            &quiz,
            seed,
            1,
            &[
                SubmittedAnswer::SelectedIndex(1),
                SubmittedAnswer::SelectedIndex(2),
                SubmittedAnswer::SelectedIndex(1),
            ],
        );
        assert!(matches!(too_many, Err(AppError::InvalidArgument(_))));

        for index in [0, 3] {
            let out_of_range = grade(&quiz, seed, 1, &[SubmittedAnswer::SelectedIndex(index)]);
            assert!(matches!(out_of_range, Err(AppError::InvalidArgument(_))));
        }
    }

    #[test]
    fn malformed_options_are_internal() {
        let quiz = quiz(QuizKind::Mcq, json!({"not": "a list"}));
        let err = grade(&quiz, Seed::new(1), 1, &[SubmittedAnswer::SelectedIndex(1)]).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
