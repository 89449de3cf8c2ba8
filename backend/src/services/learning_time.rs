// src/services/learning_time.rs

use chrono::{DateTime, Utc};

use crate::models::event_log::StudentEventLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LearningTime {
    pub duration_secs: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Turns a time-ordered slice of event logs into learning time.
pub trait LearningTimeCalculator: Send + Sync {
    fn calculate(&self, logs: &[StudentEventLog]) -> LearningTime;
}

/// Sums the spans between `started`/`resumed` and the next
/// `paused`/`exited`/`completed`. Spans still open are not counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLearningTimeCalculator;

impl LearningTimeCalculator for SessionLearningTimeCalculator {
    fn calculate(&self, logs: &[StudentEventLog]) -> LearningTime {
        let mut total = chrono::Duration::zero();
        let mut open: Option<DateTime<Utc>> = None;
        let mut completed_at = None;

        for log in logs {
            match log.event() {
                "started" | "resumed" => {
                    open.get_or_insert(log.created_at);
                }
                event @ ("paused" | "exited" | "completed") => {
                    if let Some(since) = open.take() {
                        total += log.created_at - since;
                    }
                    if event == "completed" && completed_at.is_none() {
                        completed_at = Some(log.created_at);
                    }
                }
                _ => {}
            }
        }

        LearningTime {
            duration_secs: total.num_seconds().max(0),
            completed_at,
        }
    }
}
