// src/repositories/postgres.rs

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::AppError,
    models::{
        event_log::StudentEventLog,
        progression::{Progression, StudyPlanItemIdentity},
        quiz::{QuestionGroup, QuestionHierarchy, Quiz, QuizSet, RichText},
        shuffled_quiz_set::{
            AnswerRecord, CorrectnessInfo, ShuffledQuizSet, ShuffledQuizSetPage, SubmissionUpdate,
        },
    },
    repositories::{
        EventLogSource, QuestionGroupLookup, QuizStore, SubmissionFold, correctness_info,
    },
};

const SHUFFLED_QUIZ_SET_COLUMNS: &str = "shuffled_quiz_set_id, original_quiz_set_id, student_id, \
     study_plan_id, learning_material_id, session_id, quiz_external_ids, question_hierarchy, \
     random_seed, total_correctness, submission_history, original_shuffle_quiz_set_id, \
     created_at, updated_at";

const EVENT_LOG_COLUMNS: &str =
    "id, student_id, study_plan_id, learning_material_id, event_type, payload, created_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgQuizStore {
    pool: PgPool,
}

impl PgQuizStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Helper struct for reading the 'quizzes' table.
#[derive(FromRow)]
struct QuizRow {
    quiz_id: String,
    external_id: String,
    kind: String,
    question: Json<RichText>,
    explanation: Json<RichText>,
    options: serde_json::Value,
    point: i32,
    question_group_id: Option<String>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = AppError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        Ok(Quiz {
            quiz_id: row.quiz_id,
            external_id: row.external_id,
            kind: row.kind.parse()?,
            question: row.question.0,
            explanation: row.explanation.0,
            options: row.options,
            point: row.point,
            question_group_id: row.question_group_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuizSetRow {
    quiz_set_id: String,
    learning_material_id: String,
    quiz_external_ids: Vec<String>,
    question_hierarchy: Json<QuestionHierarchy>,
    status: String,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<QuizSetRow> for QuizSet {
    fn from(row: QuizSetRow) -> Self {
        QuizSet {
            quiz_set_id: row.quiz_set_id,
            learning_material_id: row.learning_material_id,
            quiz_external_ids: row.quiz_external_ids,
            question_hierarchy: row.question_hierarchy.0,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ShuffledQuizSetRow {
    shuffled_quiz_set_id: String,
    original_quiz_set_id: String,
    student_id: String,
    study_plan_id: String,
    learning_material_id: String,
    session_id: String,
    quiz_external_ids: Vec<String>,
    question_hierarchy: Json<QuestionHierarchy>,
    random_seed: String,
    total_correctness: i32,
    submission_history: Json<Vec<AnswerRecord>>,
    original_shuffle_quiz_set_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ShuffledQuizSetRow> for ShuffledQuizSet {
    type Error = AppError;

    fn try_from(row: ShuffledQuizSetRow) -> Result<Self, Self::Error> {
        let random_seed = row.random_seed.parse().map_err(|e| {
            AppError::Internal(format!(
                "shuffled quiz set {} has a malformed seed '{}': {}",
                row.shuffled_quiz_set_id, row.random_seed, e
            ))
        })?;

        Ok(ShuffledQuizSet {
            shuffled_quiz_set_id: row.shuffled_quiz_set_id,
            original_quiz_set_id: row.original_quiz_set_id,
            student_id: row.student_id,
            study_plan_id: row.study_plan_id,
            learning_material_id: row.learning_material_id,
            session_id: row.session_id,
            quiz_external_ids: row.quiz_external_ids,
            question_hierarchy: row.question_hierarchy.0,
            random_seed,
            total_correctness: row.total_correctness,
            submission_history: row.submission_history.0,
            original_shuffle_quiz_set_id: row.original_shuffle_quiz_set_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PageRow {
    shuffled_quiz_set_id: String,
    learning_material_id: String,
    random_seed: String,
    page_ids: Vec<String>,
    total: i64,
}

#[derive(FromRow)]
struct ProgressionRow {
    progression_id: String,
    student_id: String,
    study_plan_id: String,
    learning_material_id: String,
    shuffled_quiz_set_id: String,
    quiz_external_ids: Vec<String>,
    last_index: i32,
    session_id: String,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ProgressionRow> for Progression {
    fn from(row: ProgressionRow) -> Self {
        Progression {
            progression_id: row.progression_id,
            identity: StudyPlanItemIdentity::new(
                row.student_id,
                row.study_plan_id,
                row.learning_material_id,
            ),
            shuffled_quiz_set_id: row.shuffled_quiz_set_id,
            quiz_external_ids: row.quiz_external_ids,
            last_index: row.last_index,
            session_id: row.session_id,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct QuestionGroupRow {
    question_group_id: String,
    learning_material_id: String,
    name: String,
    description: String,
    rich_description: Json<RichText>,
}

/// Appends `WHERE (student_id, study_plan_id, learning_material_id) IN (...)`.
fn push_identity_filter(qb: &mut QueryBuilder<'_, Postgres>, identities: &[StudyPlanItemIdentity]) {
    qb.push(" WHERE (student_id, study_plan_id, learning_material_id) IN ");
    qb.push_tuples(identities.iter().cloned(), |mut b, identity| {
        b.push_bind(identity.student_id)
            .push_bind(identity.study_plan_id)
            .push_bind(identity.learning_material_id);
    });
}

fn to_i32_index(index: i64) -> i32 {
    i32::try_from(index).unwrap_or(if index < 0 { 0 } else { i32::MAX })
}

#[async_trait]
impl QuizStore for PgQuizStore {
    async fn get_quiz_set_by_learning_material_id(
        &self,
        learning_material_id: &str,
    ) -> Result<QuizSet, AppError> {
        let row = sqlx::query_as::<_, QuizSetRow>(
            r#"
            SELECT quiz_set_id, learning_material_id, quiz_external_ids, question_hierarchy, status, created_at
            FROM quiz_sets
            WHERE learning_material_id = $1
              AND status = 'QUIZSET_STATUS_PUBLISHED'
              AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(learning_material_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz set: {:?}", e);
            AppError::from(e)
        })?;

        row.map(QuizSet::from).ok_or_else(|| {
            AppError::NotFound(format!(
                "quiz set of learning material {} not found",
                learning_material_id
            ))
        })
    }

    async fn get_quizzes_by_external_ids_and_learning_material_id(
        &self,
        external_ids: &[String],
        learning_material_id: &str,
    ) -> Result<Vec<Quiz>, AppError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, QuizRow>(
            r#"
            SELECT quiz_id, external_id, kind, question, explanation, options, point,
                   question_group_id, created_at
            FROM quizzes
            WHERE external_id = ANY($1)
              AND learning_material_id = $2
              AND deleted_at IS NULL
            "#,
        )
        .bind(external_ids)
        .bind(learning_material_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Quiz::try_from).collect()
    }

    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> Result<String, AppError> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO shuffled_quiz_sets (
                shuffled_quiz_set_id, original_quiz_set_id, student_id, study_plan_id,
                learning_material_id, session_id, quiz_external_ids, question_hierarchy,
                random_seed, total_correctness, submission_history, original_shuffle_quiz_set_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING shuffled_quiz_set_id
            "#,
        )
        .bind(&set.shuffled_quiz_set_id)
        .bind(&set.original_quiz_set_id)
        .bind(&set.student_id)
        .bind(&set.study_plan_id)
        .bind(&set.learning_material_id)
        .bind(&set.session_id)
        .bind(&set.quiz_external_ids)
        .bind(Json(&set.question_hierarchy))
        .bind(set.random_seed.to_string())
        .bind(set.total_correctness)
        .bind(Json(&set.submission_history))
        .bind(&set.original_shuffle_quiz_set_id)
        .bind(set.created_at)
        .bind(set.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert shuffled quiz set: {:?}", e);
            AppError::from(e)
        })?;

        Ok(id)
    }

    async fn get_shuffled_quiz_set(
        &self,
        shuffled_quiz_set_id: &str,
    ) -> Result<ShuffledQuizSet, AppError> {
        let sql = format!(
            "SELECT {} FROM shuffled_quiz_sets WHERE shuffled_quiz_set_id = $1",
            SHUFFLED_QUIZ_SET_COLUMNS
        );
        let row = sqlx::query_as::<_, ShuffledQuizSetRow>(&sql)
            .bind(shuffled_quiz_set_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| {
            AppError::NotFound(format!("shuffled quiz set {} not found", shuffled_quiz_set_id))
        })?
        .try_into()
    }

    async fn find_shuffled_quiz_set_by_session(
        &self,
        identity: &StudyPlanItemIdentity,
        session_id: &str,
    ) -> Result<Option<ShuffledQuizSet>, AppError> {
        let sql = format!(
            "SELECT {} FROM shuffled_quiz_sets \
             WHERE student_id = $1 AND study_plan_id = $2 AND learning_material_id = $3 \
               AND session_id = $4 \
             ORDER BY created_at DESC LIMIT 1",
            SHUFFLED_QUIZ_SET_COLUMNS
        );
        let row = sqlx::query_as::<_, ShuffledQuizSetRow>(&sql)
            .bind(&identity.student_id)
            .bind(&identity.study_plan_id)
            .bind(&identity.learning_material_id)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ShuffledQuizSet::try_from).transpose()
    }

    async fn list_shuffled_quiz_sets_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<ShuffledQuizSet>, AppError> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM shuffled_quiz_sets",
            SHUFFLED_QUIZ_SET_COLUMNS
        ));
        push_identity_filter(&mut qb, identities);
        qb.push(" ORDER BY created_at ASC");

        let rows: Vec<ShuffledQuizSetRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ShuffledQuizSet::try_from).collect()
    }

    async fn get_shuffled_quiz_set_page(
        &self,
        shuffled_quiz_set_id: &str,
        from: i64,
        to: i64,
    ) -> Result<ShuffledQuizSetPage, AppError> {
        let from = to_i32_index(from.max(1));
        let to = to_i32_index(to);

        // Postgres arrays are 1-based and slices outside the bounds come back empty.
        let row = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT shuffled_quiz_set_id, learning_material_id, random_seed,
                   quiz_external_ids[$2:$3] AS page_ids,
                   COALESCE(array_length(quiz_external_ids, 1), 0)::BIGINT AS total
            FROM shuffled_quiz_sets
            WHERE shuffled_quiz_set_id = $1
            "#,
        )
        .bind(shuffled_quiz_set_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("shuffled quiz set {} not found", shuffled_quiz_set_id))
        })?;

        let random_seed = row
            .random_seed
            .parse()
            .map_err(|e| AppError::Internal(format!("malformed seed '{}': {}", row.random_seed, e)))?;

        Ok(ShuffledQuizSetPage {
            shuffled_quiz_set_id: row.shuffled_quiz_set_id,
            learning_material_id: row.learning_material_id,
            random_seed,
            from: i64::from(from),
            quiz_external_ids: row.page_ids,
            total_quizzes: row.total,
        })
    }

    async fn list_external_ids_from_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        only_accepted: bool,
    ) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT answer ->> 'quiz_id'
            FROM shuffled_quiz_sets s,
                 jsonb_array_elements(s.submission_history) AS answer
            WHERE s.shuffled_quiz_set_id = $1
              AND ($2 = FALSE OR (answer ->> 'is_accepted')::BOOLEAN)
            "#,
        )
        .bind(shuffled_quiz_set_id)
        .bind(only_accepted)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn update_total_correctness_and_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        record: AnswerRecord,
        fold: SubmissionFold<'_>,
    ) -> Result<SubmissionUpdate, AppError> {
        let mut tx = self.pool.begin().await?;

        // row lock held until commit so concurrent answers queue up
        let sql = format!(
            "SELECT {} FROM shuffled_quiz_sets WHERE shuffled_quiz_set_id = $1 FOR UPDATE",
            SHUFFLED_QUIZ_SET_COLUMNS
        );
        let set: ShuffledQuizSet = sqlx::query_as::<_, ShuffledQuizSetRow>(&sql)
            .bind(shuffled_quiz_set_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("shuffled quiz set {} not found", shuffled_quiz_set_id))
            })?
            .try_into()?;

        let info = correctness_info(&set, &record.quiz_id)?;
        let update = fold(&info, record);

        sqlx::query(
            r#"
            UPDATE shuffled_quiz_sets
            SET submission_history = $2,
                total_correctness = $3,
                updated_at = NOW()
            WHERE shuffled_quiz_set_id = $1
            "#,
        )
        .bind(&update.shuffled_quiz_set_id)
        .bind(Json(&update.submission_history))
        .bind(update.total_correctness)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update submission history: {:?}", e);
            AppError::from(e)
        })?;

        if let Some(completeness) = &update.completeness {
            // first score is written once, highest score only goes up
            sqlx::query(
                r#"
                INSERT INTO learning_material_completeness (
                    student_id, study_plan_id, learning_material_id,
                    first_quiz_score, highest_quiz_score, first_completed_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $4, NOW(), NOW())
                ON CONFLICT (student_id, study_plan_id, learning_material_id) DO UPDATE SET
                    first_quiz_score = COALESCE(learning_material_completeness.first_quiz_score, EXCLUDED.first_quiz_score),
                    first_completed_at = COALESCE(learning_material_completeness.first_completed_at, EXCLUDED.first_completed_at),
                    highest_quiz_score = GREATEST(learning_material_completeness.highest_quiz_score, EXCLUDED.highest_quiz_score),
                    updated_at = NOW()
                "#,
            )
            .bind(&completeness.student_id)
            .bind(&completeness.study_plan_id)
            .bind(&completeness.learning_material_id)
            .bind(completeness.score)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update completeness: {:?}", e);
                AppError::from(e)
            })?;
        }

        tx.commit().await?;
        Ok(update)
    }

    async fn get_correctness_info(
        &self,
        shuffled_quiz_set_id: &str,
        quiz_external_id: &str,
    ) -> Result<CorrectnessInfo, AppError> {
        let set = self.get_shuffled_quiz_set(shuffled_quiz_set_id).await?;
        correctness_info(&set, quiz_external_id)
    }

    async fn upsert_progression(&self, progression: &Progression) -> Result<Progression, AppError> {
        let row = sqlx::query_as::<_, ProgressionRow>(
            r#"
            INSERT INTO lo_progressions (
                progression_id, student_id, study_plan_id, learning_material_id,
                shuffled_quiz_set_id, quiz_external_ids, last_index, session_id, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (student_id, study_plan_id, learning_material_id) DO UPDATE SET
                shuffled_quiz_set_id = EXCLUDED.shuffled_quiz_set_id,
                quiz_external_ids = EXCLUDED.quiz_external_ids,
                last_index = EXCLUDED.last_index,
                session_id = EXCLUDED.session_id,
                updated_at = NOW()
            RETURNING progression_id, student_id, study_plan_id, learning_material_id,
                      shuffled_quiz_set_id, quiz_external_ids, last_index, session_id, updated_at
            "#,
        )
        .bind(&progression.progression_id)
        .bind(&progression.identity.student_id)
        .bind(&progression.identity.study_plan_id)
        .bind(&progression.identity.learning_material_id)
        .bind(&progression.shuffled_quiz_set_id)
        .bind(&progression.quiz_external_ids)
        .bind(progression.last_index)
        .bind(&progression.session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert progression: {:?}", e);
            AppError::from(e)
        })?;

        Ok(row.into())
    }

    async fn get_progression(
        &self,
        identity: &StudyPlanItemIdentity,
    ) -> Result<Option<Progression>, AppError> {
        let row = sqlx::query_as::<_, ProgressionRow>(
            r#"
            SELECT progression_id, student_id, study_plan_id, learning_material_id,
                   shuffled_quiz_set_id, quiz_external_ids, last_index, session_id, updated_at
            FROM lo_progressions
            WHERE student_id = $1 AND study_plan_id = $2 AND learning_material_id = $3
            "#,
        )
        .bind(&identity.student_id)
        .bind(&identity.study_plan_id)
        .bind(&identity.learning_material_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Progression::from))
    }
}

#[async_trait]
impl QuestionGroupLookup for PgQuizStore {
    async fn get_question_groups_by_ids(
        &self,
        learning_material_id: &str,
        question_group_ids: &[String],
    ) -> Result<Vec<QuestionGroup>, AppError> {
        if question_group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, QuestionGroupRow>(
            r#"
            SELECT question_group_id, learning_material_id, name, description, rich_description
            FROM question_groups
            WHERE learning_material_id = $1 AND question_group_id = ANY($2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(learning_material_id)
        .bind(question_group_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| QuestionGroup {
                question_group_id: row.question_group_id,
                learning_material_id: row.learning_material_id,
                name: row.name,
                description: row.description,
                rich_description: row.rich_description.0,
            })
            .collect())
    }
}

#[async_trait]
impl EventLogSource for PgQuizStore {
    async fn retrieve_event_logs_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<StudentEventLog>, AppError> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM student_event_logs",
            EVENT_LOG_COLUMNS
        ));
        push_identity_filter(&mut qb, identities);
        qb.push(" ORDER BY created_at ASC");

        let logs = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(logs)
    }

    async fn retrieve_event_logs_by_study_plan_item_ids(
        &self,
        study_plan_item_ids: &[String],
    ) -> Result<Vec<StudentEventLog>, AppError> {
        if study_plan_item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM student_event_logs \
             WHERE payload ->> 'study_plan_item_id' = ANY($1) \
             ORDER BY created_at ASC",
            EVENT_LOG_COLUMNS
        );
        let logs = sqlx::query_as::<_, StudentEventLog>(&sql)
            .bind(study_plan_item_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(logs)
    }
}
