// src/repositories/mod.rs

//! Storage seams. Services only see these traits; `PgQuizStore` backs the
//! server and `MemoryStore` backs tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        event_log::StudentEventLog,
        progression::{Progression, StudyPlanItemIdentity},
        quiz::{QuestionGroup, Quiz, QuizSet},
        shuffled_quiz_set::{
            AnswerRecord, CorrectnessInfo, ShuffledQuizSet, ShuffledQuizSetPage, SubmissionUpdate,
        },
    },
};

pub use memory::MemoryStore;
pub use postgres::PgQuizStore;

/// Folds one graded answer into the attempt state read under the write lock.
pub type SubmissionFold<'a> =
    &'a (dyn Fn(&CorrectnessInfo, AnswerRecord) -> SubmissionUpdate + Send + Sync);

#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Latest published quiz set of a learning material.
    async fn get_quiz_set_by_learning_material_id(
        &self,
        learning_material_id: &str,
    ) -> Result<QuizSet, AppError>;

    /// Quizzes in no particular order; ids without a quiz are skipped.
    async fn get_quizzes_by_external_ids_and_learning_material_id(
        &self,
        external_ids: &[String],
        learning_material_id: &str,
    ) -> Result<Vec<Quiz>, AppError>;

    /// Persists a new attempt and returns its id.
    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> Result<String, AppError>;

    async fn get_shuffled_quiz_set(&self, shuffled_quiz_set_id: &str)
    -> Result<ShuffledQuizSet, AppError>;

    /// Most recent attempt opened by `session_id` for `identity`.
    async fn find_shuffled_quiz_set_by_session(
        &self,
        identity: &StudyPlanItemIdentity,
        session_id: &str,
    ) -> Result<Option<ShuffledQuizSet>, AppError>;

    /// Every attempt of the given identities, oldest first.
    async fn list_shuffled_quiz_sets_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<ShuffledQuizSet>, AppError>;

    /// Ids at 1-based positions `from..=to`, clamped to the set's length.
    async fn get_shuffled_quiz_set_page(
        &self,
        shuffled_quiz_set_id: &str,
        from: i64,
        to: i64,
    ) -> Result<ShuffledQuizSetPage, AppError>;

    /// Quiz ids present in an attempt's submission history.
    async fn list_external_ids_from_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        only_accepted: bool,
    ) -> Result<Vec<String>, AppError>;

    /// Reads the attempt, applies `fold` and writes history, counter and
    /// score ratchet as one unit. Concurrent calls on one attempt serialize.
    async fn update_total_correctness_and_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        record: AnswerRecord,
        fold: SubmissionFold<'_>,
    ) -> Result<SubmissionUpdate, AppError>;

    async fn get_correctness_info(
        &self,
        shuffled_quiz_set_id: &str,
        quiz_external_id: &str,
    ) -> Result<CorrectnessInfo, AppError>;

    /// Replaces the checkpoint of the progression's identity.
    async fn upsert_progression(&self, progression: &Progression) -> Result<Progression, AppError>;

    async fn get_progression(
        &self,
        identity: &StudyPlanItemIdentity,
    ) -> Result<Option<Progression>, AppError>;
}

#[async_trait]
pub trait QuestionGroupLookup: Send + Sync {
    async fn get_question_groups_by_ids(
        &self,
        learning_material_id: &str,
        question_group_ids: &[String],
    ) -> Result<Vec<QuestionGroup>, AppError>;
}

#[async_trait]
pub trait EventLogSource: Send + Sync {
    async fn retrieve_event_logs_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<StudentEventLog>, AppError>;

    async fn retrieve_event_logs_by_study_plan_item_ids(
        &self,
        study_plan_item_ids: &[String],
    ) -> Result<Vec<StudentEventLog>, AppError>;
}

/// Builds the read model a submission needs from a full attempt.
pub(crate) fn correctness_info(
    set: &ShuffledQuizSet,
    quiz_external_id: &str,
) -> Result<CorrectnessInfo, AppError> {
    let position = set
        .quiz_external_ids
        .iter()
        .position(|id| id == quiz_external_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "quiz {} is not part of shuffled quiz set {}",
                quiz_external_id, set.shuffled_quiz_set_id
            ))
        })?;

    Ok(CorrectnessInfo {
        shuffled_quiz_set_id: set.shuffled_quiz_set_id.clone(),
        student_id: set.student_id.clone(),
        study_plan_id: set.study_plan_id.clone(),
        learning_material_id: set.learning_material_id.clone(),
        random_seed: set.random_seed,
        quiz_index: position as i64 + 1,
        total_correctness: set.total_correctness,
        quiz_external_ids: set.quiz_external_ids.clone(),
        submission_history: set.submission_history.clone(),
        original_shuffle_quiz_set_id: set.original_shuffle_quiz_set_id.clone(),
    })
}

/// Slices an attempt the way `get_shuffled_quiz_set_page` does.
pub(crate) fn page_of(set: &ShuffledQuizSet, from: i64, to: i64) -> ShuffledQuizSetPage {
    let total = set.quiz_external_ids.len() as i64;
    let start = from.clamp(1, total + 1);
    let end = to.clamp(start - 1, total);
    let quiz_external_ids = set.quiz_external_ids[(start - 1) as usize..end as usize].to_vec();

    ShuffledQuizSetPage {
        shuffled_quiz_set_id: set.shuffled_quiz_set_id.clone(),
        learning_material_id: set.learning_material_id.clone(),
        random_seed: set.random_seed,
        from: start,
        quiz_external_ids,
        total_quizzes: total,
    }
}
