// src/repositories/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        event_log::StudentEventLog,
        progression::{LearningMaterialCompleteness, Progression, StudyPlanItemIdentity},
        quiz::{QuestionGroup, Quiz, QuizSet},
        shuffled_quiz_set::{
            AnswerRecord, CorrectnessInfo, ShuffledQuizSet, ShuffledQuizSetPage, SubmissionUpdate,
        },
    },
    repositories::{
        EventLogSource, QuestionGroupLookup, QuizStore, SubmissionFold, correctness_info, page_of,
    },
};

#[derive(Default)]
struct Tables {
    /// (learning material, external id) -> quiz
    quizzes: HashMap<(String, String), Quiz>,
    quiz_sets: Vec<QuizSet>,
    shuffled_quiz_sets: HashMap<String, ShuffledQuizSet>,
    question_groups: Vec<QuestionGroup>,
    event_logs: Vec<StudentEventLog>,
    progressions: HashMap<StudyPlanItemIdentity, Progression>,
    completeness: HashMap<StudyPlanItemIdentity, LearningMaterialCompleteness>,
}

/// In-process store. The lock is never held across an await point.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    pub fn insert_quiz(&self, learning_material_id: &str, quiz: Quiz) -> Result<(), AppError> {
        self.tables()?.quizzes.insert(
            (learning_material_id.to_string(), quiz.external_id.clone()),
            quiz,
        );
        Ok(())
    }

    /// Later sets of the same learning material supersede earlier ones.
    pub fn insert_quiz_set(&self, quiz_set: QuizSet) -> Result<(), AppError> {
        self.tables()?.quiz_sets.push(quiz_set);
        Ok(())
    }

    pub fn insert_question_group(&self, group: QuestionGroup) -> Result<(), AppError> {
        self.tables()?.question_groups.push(group);
        Ok(())
    }

    pub fn insert_event_log(&self, log: StudentEventLog) -> Result<(), AppError> {
        self.tables()?.event_logs.push(log);
        Ok(())
    }

    pub fn completeness(
        &self,
        identity: &StudyPlanItemIdentity,
    ) -> Result<Option<LearningMaterialCompleteness>, AppError> {
        Ok(self.tables()?.completeness.get(identity).cloned())
    }

    fn shuffled_quiz_set(&self, id: &str) -> Result<ShuffledQuizSet, AppError> {
        self.tables()?
            .shuffled_quiz_sets
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("shuffled quiz set {} not found", id)))
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn get_quiz_set_by_learning_material_id(
        &self,
        learning_material_id: &str,
    ) -> Result<QuizSet, AppError> {
        self.tables()?
            .quiz_sets
            .iter()
            .rev()
            .find(|s| s.learning_material_id == learning_material_id)
            .cloned()
            .ok_or_else(|| {
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
        let tables = self.tables()?;
        Ok(external_ids
            .iter()
            .filter_map(|id| {
                tables
                    .quizzes
                    .get(&(learning_material_id.to_string(), id.clone()))
                    .cloned()
            })
            .collect())
    }

    async fn create_shuffled_quiz_set(&self, set: &ShuffledQuizSet) -> Result<String, AppError> {
        let mut tables = self.tables()?;
        if tables.shuffled_quiz_sets.contains_key(&set.shuffled_quiz_set_id) {
            return Err(AppError::Internal(format!(
                "shuffled quiz set {} already exists",
                set.shuffled_quiz_set_id
            )));
        }
        tables
            .shuffled_quiz_sets
            .insert(set.shuffled_quiz_set_id.clone(), set.clone());
        Ok(set.shuffled_quiz_set_id.clone())
    }

    async fn get_shuffled_quiz_set(
        &self,
        shuffled_quiz_set_id: &str,
    ) -> Result<ShuffledQuizSet, AppError> {
        self.shuffled_quiz_set(shuffled_quiz_set_id)
    }

    async fn find_shuffled_quiz_set_by_session(
        &self,
        identity: &StudyPlanItemIdentity,
        session_id: &str,
    ) -> Result<Option<ShuffledQuizSet>, AppError> {
        Ok(self
            .tables()?
            .shuffled_quiz_sets
            .values()
            .filter(|s| {
                s.session_id == session_id
                    && s.student_id == identity.student_id
                    && s.study_plan_id == identity.study_plan_id
                    && s.learning_material_id == identity.learning_material_id
            })
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn list_shuffled_quiz_sets_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<ShuffledQuizSet>, AppError> {
        let mut sets: Vec<ShuffledQuizSet> = self
            .tables()?
            .shuffled_quiz_sets
            .values()
            .filter(|s| {
                identities.iter().any(|i| {
                    i.student_id == s.student_id
                        && i.study_plan_id == s.study_plan_id
                        && i.learning_material_id == s.learning_material_id
                })
            })
            .cloned()
            .collect();
        sets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sets)
    }

    async fn get_shuffled_quiz_set_page(
        &self,
        shuffled_quiz_set_id: &str,
        from: i64,
        to: i64,
    ) -> Result<ShuffledQuizSetPage, AppError> {
        let set = self.shuffled_quiz_set(shuffled_quiz_set_id)?;
        Ok(page_of(&set, from, to))
    }

    async fn list_external_ids_from_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        only_accepted: bool,
    ) -> Result<Vec<String>, AppError> {
        let set = match self.shuffled_quiz_set(shuffled_quiz_set_id) {
            Ok(set) => set,
            Err(AppError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids: Vec<String> = Vec::new();
        for record in &set.submission_history {
            if (!only_accepted || record.is_accepted) && !ids.contains(&record.quiz_id) {
                ids.push(record.quiz_id.clone());
            }
        }
        Ok(ids)
    }

    async fn update_total_correctness_and_submission_history(
        &self,
        shuffled_quiz_set_id: &str,
        record: AnswerRecord,
        fold: SubmissionFold<'_>,
    ) -> Result<SubmissionUpdate, AppError> {
        // one guard for the read and the write
        let mut tables = self.tables()?;

        let set = tables
            .shuffled_quiz_sets
            .get_mut(shuffled_quiz_set_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("shuffled quiz set {} not found", shuffled_quiz_set_id))
            })?;
        let info = correctness_info(set, &record.quiz_id)?;
        let update = fold(&info, record);

        set.submission_history = update.submission_history.clone();
        set.total_correctness = update.total_correctness;
        set.updated_at = chrono::Utc::now();

        if let Some(c) = &update.completeness {
            let identity = StudyPlanItemIdentity::new(
                c.student_id.clone(),
                c.study_plan_id.clone(),
                c.learning_material_id.clone(),
            );
            let entry = tables
                .completeness
                .entry(identity)
                .or_insert_with(|| LearningMaterialCompleteness {
                    student_id: c.student_id.clone(),
                    study_plan_id: c.study_plan_id.clone(),
                    learning_material_id: c.learning_material_id.clone(),
                    first_quiz_score: None,
                    highest_quiz_score: 0,
                    first_completed_at: None,
                });
            if entry.first_quiz_score.is_none() {
                entry.first_quiz_score = Some(c.score);
                entry.first_completed_at = Some(chrono::Utc::now());
            }
            entry.highest_quiz_score = entry.highest_quiz_score.max(c.score);
        }

        Ok(update)
    }

    async fn get_correctness_info(
        &self,
        shuffled_quiz_set_id: &str,
        quiz_external_id: &str,
    ) -> Result<CorrectnessInfo, AppError> {
        let set = self.shuffled_quiz_set(shuffled_quiz_set_id)?;
        correctness_info(&set, quiz_external_id)
    }

    async fn upsert_progression(&self, progression: &Progression) -> Result<Progression, AppError> {
        let mut tables = self.tables()?;
        let stored = match tables.progressions.get(&progression.identity) {
            // the row keeps its id across upserts
            Some(existing) => Progression {
                progression_id: existing.progression_id.clone(),
                updated_at: Some(chrono::Utc::now()),
                ..progression.clone()
            },
            None => Progression {
                updated_at: Some(chrono::Utc::now()),
                ..progression.clone()
            },
        };
        tables
            .progressions
            .insert(stored.identity.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_progression(
        &self,
        identity: &StudyPlanItemIdentity,
    ) -> Result<Option<Progression>, AppError> {
        Ok(self.tables()?.progressions.get(identity).cloned())
    }
}

#[async_trait]
impl QuestionGroupLookup for MemoryStore {
    async fn get_question_groups_by_ids(
        &self,
        learning_material_id: &str,
        question_group_ids: &[String],
    ) -> Result<Vec<QuestionGroup>, AppError> {
        Ok(self
            .tables()?
            .question_groups
            .iter()
            .filter(|g| {
                g.learning_material_id == learning_material_id
                    && question_group_ids.contains(&g.question_group_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventLogSource for MemoryStore {
    async fn retrieve_event_logs_by_identities(
        &self,
        identities: &[StudyPlanItemIdentity],
    ) -> Result<Vec<StudentEventLog>, AppError> {
        let mut logs: Vec<StudentEventLog> = self
            .tables()?
            .event_logs
            .iter()
            .filter(|log| identities.contains(&log.identity()))
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(logs)
    }

    async fn retrieve_event_logs_by_study_plan_item_ids(
        &self,
        study_plan_item_ids: &[String],
    ) -> Result<Vec<StudentEventLog>, AppError> {
        let mut logs: Vec<StudentEventLog> = self
            .tables()?
            .event_logs
            .iter()
            .filter(|log| {
                log.study_plan_item_id()
                    .is_some_and(|id| study_plan_item_ids.iter().any(|k| k == id))
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(logs)
    }
}
