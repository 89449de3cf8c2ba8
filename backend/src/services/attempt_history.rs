// src/services/attempt_history.rs

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt_history::{AttemptDetail, AttemptHistoryItem, AttemptHistoryRequest, Crown, HighestScore},
        event_log::{EventLogKeys, StudentEventLog},
        progression::StudyPlanItemIdentity,
        shuffled_quiz_set::ShuffledQuizSet,
    },
    repositories::QuizStore,
    services::{aggregator::EventLogAggregator, learning_time::LearningTimeCalculator},
};

type SessionKey = (StudyPlanItemIdentity, String);

fn identity_of(set: &ShuffledQuizSet) -> StudyPlanItemIdentity {
    StudyPlanItemIdentity::new(
        set.student_id.clone(),
        set.study_plan_id.clone(),
        set.learning_material_id.clone(),
    )
}

/// Quizzes an attempt is scored against. Retries count every quiz seen
/// across the attempts they descend from.
fn total_quiz(set: &ShuffledQuizSet) -> i32 {
    if set.is_retry() {
        set.submission_history
            .iter()
            .map(|r| r.quiz_id.as_str())
            .chain(set.quiz_external_ids.iter().map(String::as_str))
            .collect::<HashSet<_>>()
            .len() as i32
    } else {
        set.quiz_external_ids.len() as i32
    }
}

fn group_by_session(logs: Vec<StudentEventLog>) -> HashMap<SessionKey, Vec<StudentEventLog>> {
    let mut grouped: HashMap<SessionKey, Vec<StudentEventLog>> = HashMap::new();
    for log in logs {
        let Some(session_id) = log.session_id().map(str::to_string) else {
            continue;
        };
        grouped
            .entry((log.identity(), session_id))
            .or_default()
            .push(log);
    }
    grouped
}

/// Completed attempts first, most recent first.
fn newest_first(a: &AttemptDetail, b: &AttemptDetail) -> Ordering {
    match (a.completed_at, b.completed_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
}

fn better(a: &AttemptDetail, b: &AttemptDetail) -> bool {
    i64::from(a.total_correctness) * i64::from(b.total_quiz.max(1))
        > i64::from(b.total_correctness) * i64::from(a.total_quiz.max(1))
}

fn summarize(identity: StudyPlanItemIdentity, mut attempts: Vec<AttemptDetail>) -> AttemptHistoryItem {
    attempts.sort_by(newest_first);

    let total_attempts = attempts.iter().filter(|a| !a.is_retry).count() as i32;
    let best = attempts
        .iter()
        .fold(None::<&AttemptDetail>, |best, a| match best {
            Some(b) if !better(a, b) => Some(b),
            _ => Some(a),
        });

    let (highest_score, crown) = match best {
        Some(best) => (
            Some(HighestScore {
                total_correctness: best.total_correctness,
                total_quiz: best.total_quiz,
            }),
            Crown::for_score(best.total_correctness, best.total_quiz),
        ),
        None => (None, Crown::None),
    };

    AttemptHistoryItem {
        study_plan_item_identity: identity,
        total_attempts,
        highest_score,
        crown,
        attempts,
    }
}

/// Per-identity attempt summaries, in request order.
pub async fn retrieve_attempt_history(
    store: &dyn QuizStore,
    aggregator: &EventLogAggregator,
    calculator: &dyn LearningTimeCalculator,
    req: AttemptHistoryRequest,
    cancel: &CancellationToken,
) -> Result<Vec<AttemptHistoryItem>, AppError> {
    req.validate()?;
    let identities = req.study_plan_item_identities;

    let sets = store.list_shuffled_quiz_sets_by_identities(&identities).await?;
    let logs = aggregator
        .retrieve(&EventLogKeys::Identities(identities.clone()), cancel)
        .await?;
    let sessions = group_by_session(logs);

    let mut by_identity: HashMap<StudyPlanItemIdentity, Vec<AttemptDetail>> = HashMap::new();
    for set in sets {
        let identity = identity_of(&set);
        let time = sessions
            .get(&(identity.clone(), set.session_id.clone()))
            .map(|logs| calculator.calculate(logs))
            .unwrap_or_default();

        let total_quiz = total_quiz(&set);
        let finished = !set.quiz_external_ids.is_empty()
            && set.quiz_external_ids.iter().all(|id| {
                set.submission_history.iter().any(|r| &r.quiz_id == id)
            });
        let completed_at = time
            .completed_at
            .or_else(|| finished.then_some(set.updated_at));

        let keep = match req.is_completed {
            Some(true) => completed_at.is_some(),
            Some(false) => completed_at.is_none(),
            None => true,
        };
        if !keep {
            continue;
        }

        by_identity.entry(identity).or_default().push(AttemptDetail {
            shuffled_quiz_set_id: set.shuffled_quiz_set_id.clone(),
            session_id: set.session_id.clone(),
            total_correctness: set.total_correctness,
            total_quiz,
            is_retry: set.is_retry(),
            learning_time_secs: time.duration_secs,
            created_at: set.created_at,
            completed_at,
        });
    }

    Ok(identities
        .into_iter()
        .map(|identity| {
            let attempts = by_identity.get(&identity).cloned().unwrap_or_default();
            summarize(identity, attempts)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn attempt(id: &str, correct: i32, total: i32, retry: bool, created: i64, completed: Option<i64>) -> AttemptDetail {
        AttemptDetail {
            shuffled_quiz_set_id: id.into(),
            session_id: format!("session-{}", id),
            total_correctness: correct,
            total_quiz: total,
            is_retry: retry,
            learning_time_secs: 0,
            created_at: ts(created),
            completed_at: completed.map(ts),
        }
    }

    #[test]
    fn counts_only_first_attempts_and_keeps_best_ratio() {
        let item = summarize(
            StudyPlanItemIdentity::new("s", "p", "lm"),
            vec![
                attempt("a", 3, 5, false, 10, Some(20)),
                attempt("b", 4, 5, true, 30, Some(40)),
                attempt("c", 1, 5, false, 50, None),
            ],
        );

        assert_eq!(item.total_attempts, 2);
        assert_eq!(
            item.highest_score,
            Some(HighestScore {
                total_correctness: 4,
                total_quiz: 5
            })
        );
        assert_eq!(item.crown, Crown::Silver);
        let order: Vec<_> = item.attempts.iter().map(|a| a.shuffled_quiz_set_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn no_attempts_no_crown() {
        let item = summarize(StudyPlanItemIdentity::new("s", "p", "lm"), Vec::new());
        assert_eq!(item.total_attempts, 0);
        assert_eq!(item.highest_score, None);
        assert_eq!(item.crown, Crown::None);
    }

    #[test]
    fn uncompleted_ties_break_on_creation() {
        let mut attempts = vec![
            attempt("old", 0, 1, false, 1, None),
            attempt("new", 0, 1, false, 2, None),
        ];
        attempts.sort_by(newest_first);
        assert_eq!(attempts[0].shuffled_quiz_set_id, "new");
    }
}
