// src/models/attempt_history.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::progression::StudyPlanItemIdentity;

/// DTO for `POST /api/quiz-tests/history`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttemptHistoryRequest {
    #[validate(length(min = 1, message = "at least one identity is required"), nested)]
    pub study_plan_item_identities: Vec<StudyPlanItemIdentity>,

    /// Keep only completed (`true`) or only unfinished (`false`) attempts.
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Crown {
    Gold,
    Silver,
    Bronze,
    None,
}

impl Crown {
    /// Tier earned by `correct` out of `total`.
    pub fn for_score(correct: i32, total: i32) -> Self {
        if total <= 0 {
            return Crown::None;
        }
        let (correct, total) = (i64::from(correct) * 100, i64::from(total));
        if correct >= 100 * total {
            Crown::Gold
        } else if correct >= 80 * total {
            Crown::Silver
        } else if correct >= 60 * total {
            Crown::Bronze
        } else {
            Crown::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptDetail {
    pub shuffled_quiz_set_id: String,
    pub session_id: String,
    pub total_correctness: i32,
    pub total_quiz: i32,
    pub is_retry: bool,
    pub learning_time_secs: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AttemptDetail {
    pub fn ratio(&self) -> f64 {
        if self.total_quiz <= 0 {
            0.0
        } else {
            f64::from(self.total_correctness) / f64::from(self.total_quiz)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighestScore {
    pub total_correctness: i32,
    pub total_quiz: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptHistoryItem {
    pub study_plan_item_identity: StudyPlanItemIdentity,
    pub total_attempts: i32,
    pub highest_score: Option<HighestScore>,
    pub crown: Crown,
    pub attempts: Vec<AttemptDetail>,
}
