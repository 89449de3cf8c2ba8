// src/services/shuffle.rs

use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{
        progression::StudyPlanItemIdentity,
        quiz::{PublicOption, PublicQuiz, QuestionHierarchy, Quiz, QuizOption},
        shuffled_quiz_set::{AnswerRecord, Seed, ShuffledQuizSet, ShuffledQuizSetPage},
    },
    repositories::QuizStore,
    utils::shuffle::{reorders_options, shuffle_external_ids, shuffle_options},
};

/// Candidate seeds tried before settling for one that leaves some options in place.
pub const MAX_SEED_ATTEMPTS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    /// Search from the current wall-clock time.
    Clock,
    /// Use this seed as is.
    Fixed(Seed),
}

/// State carried from the attempt being retried.
#[derive(Debug, Clone)]
pub struct RetryBase {
    pub original_shuffle_quiz_set_id: String,
    pub quiz_external_ids: Vec<String>,
    pub question_hierarchy: QuestionHierarchy,
    pub total_correctness: i32,
    pub submission_history: Vec<AnswerRecord>,
}

#[derive(Debug, Clone)]
pub struct NewShuffledSet {
    pub identity: StudyPlanItemIdentity,
    pub session_id: String,
    pub seed_source: SeedSource,
    pub keep_order: bool,
    pub retry: Option<RetryBase>,
}

/// Options of `quiz` in display order for the quiz at `position`.
pub fn displayed_options(
    quiz: &Quiz,
    seed: Seed,
    position: i64,
) -> Result<Vec<QuizOption>, serde_json::Error> {
    let options = quiz.decode_options()?;
    if quiz.kind.has_shuffled_options() {
        Ok(shuffle_options(&options, seed, position))
    } else {
        Ok(options)
    }
}

/// Picks the attempt seed. Clock seeds are searched forward until every
/// shuffle-eligible quiz shows its options out of authored order.
pub fn pick_seed(start: Seed, ids: &[String], quizzes: &[Quiz], keep_order: bool) -> Seed {
    let eligible: HashMap<&str, usize> = quizzes
        .iter()
        .filter(|q| q.kind.has_shuffled_options())
        .filter_map(|q| {
            let n = q.decode_options().ok()?.len();
            (n >= 2).then_some((q.external_id.as_str(), n))
        })
        .collect();

    let mut candidate = start;
    for attempt in 1..=MAX_SEED_ATTEMPTS {
        let order = if keep_order {
            ids.to_vec()
        } else {
            shuffle_external_ids(ids, candidate)
        };

        let all_reordered = order.iter().enumerate().all(|(i, id)| {
            eligible
                .get(id.as_str())
                .is_none_or(|&n| reorders_options(candidate, i as i64 + 1, n))
        });
        if all_reordered {
            return candidate;
        }
        if attempt == MAX_SEED_ATTEMPTS {
            break;
        }
        candidate = candidate.next();
    }

    tracing::warn!(
        quiz_external_ids = ?ids,
        "no seed reorders every quiz's options, keeping seed {}",
        candidate
    );
    candidate
}

/// Creates and stores a new attempt of the identity's learning material.
pub async fn create_shuffled_set(
    store: &dyn QuizStore,
    req: NewShuffledSet,
) -> Result<ShuffledQuizSet, AppError> {
    let learning_material_id = req.identity.learning_material_id.clone();
    let quiz_set = store
        .get_quiz_set_by_learning_material_id(&learning_material_id)
        .await?;

    let (ids, hierarchy, total_correctness, history, original) = match req.retry {
        Some(base) => (
            base.quiz_external_ids,
            base.question_hierarchy,
            base.total_correctness,
            base.submission_history,
            Some(base.original_shuffle_quiz_set_id),
        ),
        None => (
            quiz_set.quiz_external_ids.clone(),
            quiz_set.question_hierarchy.clone(),
            0,
            Vec::new(),
            None,
        ),
    };

    let seed = match req.seed_source {
        SeedSource::Fixed(seed) => seed,
        SeedSource::Clock => {
            let quizzes = store
                .get_quizzes_by_external_ids_and_learning_material_id(&ids, &learning_material_id)
                .await?;
            pick_seed(Seed::from_clock(), &ids, &quizzes, req.keep_order)
        }
    };

    let quiz_external_ids = if req.keep_order {
        ids
    } else {
        shuffle_external_ids(&ids, seed)
    };

    let now = chrono::Utc::now();
    let set = ShuffledQuizSet {
        shuffled_quiz_set_id: uuid::Uuid::new_v4().to_string(),
        original_quiz_set_id: quiz_set.quiz_set_id,
        student_id: req.identity.student_id,
        study_plan_id: req.identity.study_plan_id,
        learning_material_id,
        session_id: req.session_id,
        quiz_external_ids,
        question_hierarchy: hierarchy,
        random_seed: seed,
        total_correctness,
        submission_history: history,
        original_shuffle_quiz_set_id: original,
        created_at: now,
        updated_at: now,
    };

    store.create_shuffled_quiz_set(&set).await?;
    tracing::info!(
        shuffled_quiz_set_id = %set.shuffled_quiz_set_id,
        quizzes = set.quiz_external_ids.len(),
        retry = set.is_retry(),
        "created shuffled quiz set"
    );
    Ok(set)
}

/// Pairs each page position with its quiz, in page order. Ids without
/// content are logged and skipped.
pub fn order_by_page(page: &ShuffledQuizSetPage, quizzes: Vec<Quiz>) -> Vec<(i64, Quiz)> {
    let mut by_id: HashMap<String, Quiz> = quizzes
        .into_iter()
        .map(|q| (q.external_id.clone(), q))
        .collect();

    page.positioned()
        .filter_map(|(position, id)| match by_id.remove(id) {
            Some(quiz) => Some((position, quiz)),
            None => {
                tracing::warn!(
                    shuffled_quiz_set_id = %page.shuffled_quiz_set_id,
                    quiz_id = %id,
                    "quiz on page has no content"
                );
                None
            }
        })
        .collect()
}

/// Fields of a stored option a student may see.
const PUBLIC_OPTION_FIELDS: [&str; 4] = ["content", "configs", "label", "key"];

/// Stored options in authored order with every non-public field dropped.
/// Entries that are not objects are skipped.
fn unshuffled_public_options(options: &serde_json::Value) -> serde_json::Value {
    let public: Vec<serde_json::Value> = options
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_object)
                .map(|option| {
                    option
                        .iter()
                        .filter(|(field, _)| PUBLIC_OPTION_FIELDS.contains(&field.as_str()))
                        .map(|(field, value)| (field.clone(), value.clone()))
                        .collect::<serde_json::Map<String, serde_json::Value>>()
                })
                .map(serde_json::Value::Object)
                .collect()
        })
        .unwrap_or_default();
    serde_json::Value::Array(public)
}

/// Student view of a quiz. When its options cannot be decoded they are
/// sent in authored order, still without answers.
pub fn public_quiz(shuffled_quiz_set_id: &str, quiz: &Quiz, seed: Seed, position: i64) -> PublicQuiz {
    let options = displayed_options(quiz, seed, position).and_then(|options| {
        let public: Vec<PublicOption> = options.iter().map(PublicOption::from).collect();
        serde_json::to_value(public)
    });

    let options = match options {
        Ok(options) => options,
        Err(e) => {
            tracing::warn!(
                shuffled_quiz_set_id = %shuffled_quiz_set_id,
                quiz_id = %quiz.external_id,
                "cannot shuffle options, sending them unshuffled: {}",
                e
            );
            unshuffled_public_options(&quiz.options)
        }
    };

    PublicQuiz {
        quiz_id: quiz.quiz_id.clone(),
        external_id: quiz.external_id.clone(),
        kind: quiz.kind,
        question: quiz.question.clone(),
        options,
        point: quiz.point,
        question_group_id: quiz.question_group_id.clone(),
    }
}

/// Quizzes of one page in page order with their options in display order.
pub fn shuffle_options_for_page(page: &ShuffledQuizSetPage, quizzes: Vec<Quiz>) -> Vec<PublicQuiz> {
    order_by_page(page, quizzes)
        .iter()
        .map(|(position, quiz)| {
            public_quiz(&page.shuffled_quiz_set_id, quiz, page.random_seed, *position)
        })
        .collect()
}
