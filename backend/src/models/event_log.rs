// src/models/event_log.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::progression::StudyPlanItemIdentity;

/// Represents the 'student_event_logs' table. Read-only telemetry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StudentEventLog {
    pub id: i64,
    pub student_id: String,
    pub study_plan_id: String,
    pub learning_material_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl StudentEventLog {
    pub fn identity(&self) -> StudyPlanItemIdentity {
        StudyPlanItemIdentity::new(
            self.student_id.clone(),
            self.study_plan_id.clone(),
            self.learning_material_id.clone(),
        )
    }

    pub fn session_id(&self) -> Option<&str> {
        self.payload_str("session_id")
    }

    pub fn study_plan_item_id(&self) -> Option<&str> {
        self.payload_str("study_plan_item_id")
    }

    /// Lifecycle event name: payload `event` wins over the row's type.
    pub fn event(&self) -> &str {
        self.payload_str("event").unwrap_or(&self.event_type)
    }

    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// The two key shapes event logs can be fetched by.
#[derive(Debug, Clone, PartialEq)]
pub enum EventLogKeys {
    Identities(Vec<StudyPlanItemIdentity>),
    StudyPlanItemIds(Vec<String>),
}

impl EventLogKeys {
    pub fn len(&self) -> usize {
        match self {
            EventLogKeys::Identities(keys) => keys.len(),
            EventLogKeys::StudyPlanItemIds(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the keys into consecutive chunks of at most `size`.
    pub fn chunks(&self, size: usize) -> Vec<EventLogKeys> {
        let size = size.max(1);
        match self {
            EventLogKeys::Identities(keys) => keys
                .chunks(size)
                .map(|c| EventLogKeys::Identities(c.to_vec()))
                .collect(),
            EventLogKeys::StudyPlanItemIds(keys) => keys
                .chunks(size)
                .map(|c| EventLogKeys::StudyPlanItemIds(c.to_vec()))
                .collect(),
        }
    }
}
