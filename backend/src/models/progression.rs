// src/models/progression.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// (student, study plan, learning material) triple that keys attempts,
/// checkpoints and event logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRow, Serialize, Deserialize, Validate)]
pub struct StudyPlanItemIdentity {
    #[validate(length(min = 1, message = "student_id is required"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "study_plan_id is required"))]
    pub study_plan_id: String,
    #[validate(length(min = 1, message = "learning_material_id is required"))]
    pub learning_material_id: String,
}

impl StudyPlanItemIdentity {
    pub fn new(
        student_id: impl Into<String>,
        study_plan_id: impl Into<String>,
        learning_material_id: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            study_plan_id: study_plan_id.into(),
            learning_material_id: learning_material_id.into(),
        }
    }
}

/// Resumable checkpoint. One row per identity; upserts replace it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progression {
    pub progression_id: String,
    #[serde(flatten)]
    pub identity: StudyPlanItemIdentity,
    pub shuffled_quiz_set_id: String,
    pub quiz_external_ids: Vec<String>,
    pub last_index: i32,
    pub session_id: String,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for saving a checkpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertProgressionRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub identity: StudyPlanItemIdentity,

    #[validate(length(min = 1, message = "shuffled_quiz_set_id is required"))]
    pub shuffled_quiz_set_id: String,

    #[serde(default)]
    pub quiz_external_ids: Vec<String>,

    #[validate(range(min = 0, message = "last_index must not be negative"))]
    pub last_index: i32,

    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
}

/// Score ratchet of one learning material for one student.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LearningMaterialCompleteness {
    pub student_id: String,
    pub study_plan_id: String,
    pub learning_material_id: String,
    pub first_quiz_score: Option<i32>,
    pub highest_quiz_score: i32,
    pub first_completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
