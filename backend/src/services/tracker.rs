// src/services/tracker.rs

use std::collections::{HashMap, HashSet};

use validator::Validate;

use crate::{
    error::AppError,
    models::{
        progression::{Progression, StudyPlanItemIdentity, UpsertProgressionRequest},
        shuffled_quiz_set::{AnswerRecord, CompletenessUpdate, CorrectnessInfo, SubmissionUpdate},
        quiz_test::SubmitAnswerRequest,
    },
    repositories::QuizStore,
    services::grading::Grader,
};

/// Folds one graded answer into an attempt.
///
/// Retry attempts carry the history of the attempt they retry, so an
/// answer replaces the earlier record of the same quiz. Fresh attempts
/// append, and only the latest record of each quiz counts. A score update
/// is produced once every quiz of the attempt has an answer, and on every
/// retry answer.
pub fn record_answer(info: &CorrectnessInfo, record: AnswerRecord) -> SubmissionUpdate {
    let is_retry = info.original_shuffle_quiz_set_id.is_some();
    let mut history = info.submission_history.clone();

    let existing = if is_retry {
        history.iter().position(|r| r.quiz_id == record.quiz_id)
    } else {
        None
    };
    match existing {
        Some(i) => history[i] = record,
        None => history.push(record),
    }

    let latest = latest_per_quiz(&history);
    let total_correctness = latest.values().filter(|r| r.is_accepted).count() as i32;
    let finished = info
        .quiz_external_ids
        .iter()
        .all(|id| latest.contains_key(id.as_str()));

    let completeness = (is_retry || finished).then(|| {
        let effective_total = if is_retry {
            latest
                .keys()
                .copied()
                .chain(info.quiz_external_ids.iter().map(String::as_str))
                .collect::<HashSet<_>>()
                .len()
        } else {
            info.quiz_external_ids.len()
        };

        CompletenessUpdate {
            student_id: info.student_id.clone(),
            study_plan_id: info.study_plan_id.clone(),
            learning_material_id: info.learning_material_id.clone(),
            score: score(total_correctness, effective_total),
        }
    });

    SubmissionUpdate {
        shuffled_quiz_set_id: info.shuffled_quiz_set_id.clone(),
        total_correctness,
        submission_history: history,
        completeness,
    }
}

/// Last record of each answered quiz.
fn latest_per_quiz(history: &[AnswerRecord]) -> HashMap<&str, &AnswerRecord> {
    history.iter().map(|r| (r.quiz_id.as_str(), r)).collect()
}

/// Whole percent, rounded down.
fn score(correct: i32, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    (i64::from(correct) * 100 / total as i64) as i32
}

/// Grades an answer and persists it with the attempt's updated counters.
pub async fn submit_answer(
    store: &dyn QuizStore,
    grader: &Grader,
    shuffled_quiz_set_id: &str,
    req: SubmitAnswerRequest,
) -> Result<AnswerRecord, AppError> {
    req.validate()?;

    let info = store
        .get_correctness_info(shuffled_quiz_set_id, &req.quiz_id)
        .await?;

    let quiz = store
        .get_quizzes_by_external_ids_and_learning_material_id(
            std::slice::from_ref(&req.quiz_id),
            &info.learning_material_id,
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("quiz {} not found", req.quiz_id)))?;

    let record = grader.grade(&quiz, info.random_seed, info.quiz_index, &req.answers)?;

    // history is re-read under the store's write lock
    let update = store
        .update_total_correctness_and_submission_history(
            shuffled_quiz_set_id,
            record.clone(),
            &record_answer,
        )
        .await?;

    tracing::info!(
        shuffled_quiz_set_id = %shuffled_quiz_set_id,
        quiz_id = %req.quiz_id,
        accepted = record.is_accepted,
        total_correctness = update.total_correctness,
        "answer recorded"
    );
    Ok(record)
}

/// Replaces the identity's checkpoint.
pub async fn upsert_progression(
    store: &dyn QuizStore,
    req: UpsertProgressionRequest,
) -> Result<Progression, AppError> {
    req.validate()?;

    let set = store.get_shuffled_quiz_set(&req.shuffled_quiz_set_id).await?;
    if set.student_id != req.identity.student_id
        || set.study_plan_id != req.identity.study_plan_id
        || set.learning_material_id != req.identity.learning_material_id
    {
        return Err(AppError::InvalidArgument(format!(
            "shuffled quiz set {} belongs to another study plan item",
            req.shuffled_quiz_set_id
        )));
    }

    let quiz_external_ids = if req.quiz_external_ids.is_empty() {
        set.quiz_external_ids
    } else {
        req.quiz_external_ids
    };

    let progression = Progression {
        progression_id: uuid::Uuid::new_v4().to_string(),
        identity: req.identity,
        shuffled_quiz_set_id: req.shuffled_quiz_set_id,
        quiz_external_ids,
        last_index: req.last_index,
        session_id: req.session_id,
        updated_at: None,
    };

    store.upsert_progression(&progression).await
}

pub async fn get_progression(
    store: &dyn QuizStore,
    identity: &StudyPlanItemIdentity,
) -> Result<Progression, AppError> {
    identity.validate()?;

    store.get_progression(identity).await?.ok_or_else(|| {
        AppError::NotFound(format!(
            "no progression for learning material {}",
            identity.learning_material_id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{quiz::QuizKind, shuffled_quiz_set::Seed};

    fn answer(quiz_id: &str, accepted: bool) -> AnswerRecord {
        let mut record = AnswerRecord::new(quiz_id, QuizKind::Mcq);
        record.is_accepted = accepted;
        record
    }

    fn info(ids: &[&str], history: Vec<AnswerRecord>, retry_of: Option<&str>) -> CorrectnessInfo {
        CorrectnessInfo {
            shuffled_quiz_set_id: "set".into(),
            student_id: "s".into(),
            study_plan_id: "p".into(),
            learning_material_id: "lm".into(),
            random_seed: Seed::new(1),
            quiz_index: 1,
            total_correctness: 0,
            quiz_external_ids: ids.iter().map(|s| s.to_string()).collect(),
            submission_history: history,
            original_shuffle_quiz_set_id: retry_of.map(str::to_string),
        }
    }

    #[test]
    fn fresh_attempt_appends_and_counts() {
        let update = record_answer(&info(&["A", "B"], vec![], None), answer("A", true));
        assert_eq!(update.submission_history.len(), 1);
        assert_eq!(update.total_correctness, 1);
        assert!(update.completeness.is_none());
    }

    #[test]
    fn last_answer_completes_the_attempt() {
        let update = record_answer(
            &info(&["A", "B", "C"], vec![answer("A", true), answer("B", false)], None),
            answer("C", true),
        );
        assert_eq!(update.total_correctness, 2);
        assert_eq!(update.completeness.unwrap().score, 66);
    }

    #[test]
    fn retry_replaces_carried_answer() {
        let carried = vec![answer("A", true), answer("B", false), answer("C", false)];
        let update = record_answer(&info(&["B", "C"], carried, Some("original")), answer("B", true));

        assert_eq!(update.submission_history.len(), 3);
        assert_eq!(update.submission_history[1].quiz_id, "B");
        assert!(update.submission_history[1].is_accepted);
        assert_eq!(update.total_correctness, 2);
        // retry answers always refresh the score over the whole quiz set
        assert_eq!(update.completeness.unwrap().score, 66);
    }

    #[test]
    fn retry_appends_unseen_quiz() {
        let update = record_answer(
            &info(&["B"], vec![answer("A", true)], Some("original")),
            answer("B", true),
        );
        assert_eq!(update.submission_history.len(), 2);
        assert_eq!(update.completeness.unwrap().score, 100);
    }

    #[test]
    fn repeated_answers_do_not_complete_the_attempt() {
        let update = record_answer(
            &info(&["A", "B", "C"], vec![answer("A", true), answer("A", true)], None),
            answer("A", true),
        );
        assert_eq!(update.submission_history.len(), 3);
        assert_eq!(update.total_correctness, 1);
        assert!(update.completeness.is_none());
    }

    #[test]
    fn latest_answer_of_a_quiz_counts() {
        let update = record_answer(
            &info(&["A", "B"], vec![answer("A", true), answer("B", true)], None),
            answer("A", false),
        );
        assert_eq!(update.total_correctness, 1);
        assert_eq!(update.completeness.unwrap().score, 50);
    }

    #[tokio::test]
    async fn simultaneous_answers_are_both_recorded() {
        use crate::models::{
            progression::StudyPlanItemIdentity,
            quiz::{Quiz, QuizSet, RichText},
            quiz_test::SubmitAnswerRequest,
            shuffled_quiz_set::SubmittedAnswer,
        };
        use crate::repositories::MemoryStore;
        use crate::services::shuffle::{NewShuffledSet, SeedSource, create_shuffled_set};

        let store = MemoryStore::new();
        for (id, text) in [("A", "alpha"), ("B", "beta")] {
            store
                .insert_quiz(
                    "lm",
                    Quiz {
                        quiz_id: format!("row-{}", id),
                        external_id: id.into(),
                        kind: QuizKind::Fib,
                        question: RichText::plain(id),
                        explanation: RichText::default(),
                        options: serde_json::json!([{"content": {"raw": text}}]),
                        point: 1,
                        question_group_id: None,
                        created_at: None,
                    },
                )
                .unwrap();
        }
        store
            .insert_quiz_set(QuizSet {
                quiz_set_id: "qs".into(),
                learning_material_id: "lm".into(),
                quiz_external_ids: vec!["A".into(), "B".into()],
                question_hierarchy: Vec::new(),
                status: "QUIZSET_STATUS_PUBLISHED".into(),
                created_at: None,
            })
            .unwrap();
        let set = create_shuffled_set(
            &store,
            NewShuffledSet {
                identity: StudyPlanItemIdentity::new("s", "p", "lm"),
                session_id: "sess".into(),
                seed_source: SeedSource::Fixed(Seed::new(5)),
                keep_order: true,
                retry: None,
            },
        )
        .await
        .unwrap();

        let grader = Grader::default();
        let submit = |quiz_id: &str, text: &str| SubmitAnswerRequest {
            quiz_id: quiz_id.into(),
            answers: vec![SubmittedAnswer::FilledText(text.into())],
        };
        let (a, b) = tokio::join!(
            submit_answer(&store, &grader, &set.shuffled_quiz_set_id, submit("A", "alpha")),
            submit_answer(&store, &grader, &set.shuffled_quiz_set_id, submit("B", "beta")),
        );
        assert!(a.unwrap().is_accepted);
        assert!(b.unwrap().is_accepted);

        let stored = store.get_shuffled_quiz_set(&set.shuffled_quiz_set_id).await.unwrap();
        let mut answered: Vec<_> = stored.submission_history.iter().map(|r| r.quiz_id.as_str()).collect();
        answered.sort();
        assert_eq!(answered, vec!["A", "B"]);
        assert_eq!(stored.total_correctness, 2);

        let c = store.completeness(&StudyPlanItemIdentity::new("s", "p", "lm")).unwrap().unwrap();
        assert_eq!(c.first_quiz_score, Some(100));
    }

    #[test]
    fn empty_set_scores_zero() {
        assert_eq!(score(0, 0), 0);
        assert_eq!(score(1, 3), 33);
    }
}
