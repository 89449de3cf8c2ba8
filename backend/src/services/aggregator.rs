// src/services/aggregator.rs

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppError,
    models::event_log::{EventLogKeys, StudentEventLog},
    repositories::EventLogSource,
};

/// Fetches event logs in fixed-size chunks, one task per chunk, and merges
/// them into a single sequence ordered by creation time.
#[derive(Clone)]
pub struct EventLogAggregator {
    source: Arc<dyn EventLogSource>,
    chunk_size: usize,
}

async fn fetch_chunk(
    source: &dyn EventLogSource,
    chunk: &EventLogKeys,
) -> Result<Vec<StudentEventLog>, AppError> {
    match chunk {
        EventLogKeys::Identities(identities) => {
            source.retrieve_event_logs_by_identities(identities).await
        }
        EventLogKeys::StudyPlanItemIds(ids) => {
            source.retrieve_event_logs_by_study_plan_item_ids(ids).await
        }
    }
}

fn cancelled() -> AppError {
    AppError::Cancelled("event log retrieval cancelled".to_string())
}

impl EventLogAggregator {
    pub fn new(source: Arc<dyn EventLogSource>, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Waits for every chunk before looking at any result. One failed
    /// chunk fails the whole call.
    pub async fn retrieve(
        &self,
        keys: &EventLogKeys,
        cancel: &CancellationToken,
    ) -> Result<Vec<StudentEventLog>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let chunks = keys.chunks(self.chunk_size);
        let chunk_count = chunks.len();
        tracing::debug!(keys = keys.len(), chunks = chunk_count, "retrieving event logs");

        // sized so no task ever waits on a send
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, Vec<StudentEventLog>)>(chunk_count);
        let (error_tx, mut error_rx) = mpsc::channel::<AppError>(chunk_count);

        let handles: Vec<_> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let source = Arc::clone(&self.source);
                let result_tx = result_tx.clone();
                let error_tx = error_tx.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    let fetched = tokio::select! {
                        _ = cancel.cancelled() => Err(cancelled()),
                        fetched = fetch_chunk(source.as_ref(), &chunk) => fetched,
                    };

                    // the receiver is gone when the caller already gave up
                    match fetched {
                        Ok(logs) => {
                            let _ = result_tx.send((index, logs)).await;
                        }
                        Err(e) => {
                            let _ = error_tx.send(e).await;
                        }
                    }
                })
            })
            .collect();
        drop(result_tx);
        drop(error_tx);

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            joined = join_all(handles) => {
                for outcome in joined {
                    outcome?;
                }
            }
        }

        if let Ok(err) = error_rx.try_recv() {
            tracing::error!("event log chunk failed: {}", err);
            return Err(err);
        }

        let mut tagged = Vec::with_capacity(chunk_count);
        while let Ok(item) = result_rx.try_recv() {
            tagged.push(item);
        }
        tagged.sort_by_key(|(index, _)| *index);

        let mut logs: Vec<StudentEventLog> =
            tagged.into_iter().flat_map(|(_, logs)| logs).collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progression::StudyPlanItemIdentity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns one log per key, timestamped by the key's number, so that
    /// later chunks hold earlier events.
    struct NumberedSource {
        calls: AtomicUsize,
        /// Fetches that ran to completion or were dropped.
        settled: Arc<AtomicUsize>,
        fail_on: Option<String>,
        delay: Duration,
        /// Every log gets the same timestamp.
        same_time: bool,
        /// Chunks holding lower keys take longer.
        stagger: bool,
    }

    impl NumberedSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                settled: Arc::new(AtomicUsize::new(0)),
                fail_on: None,
                delay: Duration::ZERO,
                same_time: false,
                stagger: false,
            }
        }
    }

    struct Settled(Arc<AtomicUsize>);

    impl Drop for Settled {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn log(key: &str, same_time: bool) -> StudentEventLog {
        let n: i64 = key.parse().unwrap();
        let secs = if same_time { 1_000_000 } else { 1_000_000 - n * 10 };
        StudentEventLog {
            id: n,
            student_id: "s".into(),
            study_plan_id: "p".into(),
            learning_material_id: key.into(),
            event_type: "started".into(),
            payload: serde_json::json!({"study_plan_item_id": key}),
            created_at: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[async_trait]
    impl EventLogSource for NumberedSource {
        async fn retrieve_event_logs_by_identities(
            &self,
            identities: &[StudyPlanItemIdentity],
        ) -> Result<Vec<StudentEventLog>, AppError> {
            let ids: Vec<String> = identities
                .iter()
                .map(|i| i.learning_material_id.clone())
                .collect();
            self.retrieve_event_logs_by_study_plan_item_ids(&ids).await
        }

        async fn retrieve_event_logs_by_study_plan_item_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<StudentEventLog>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _settled = Settled(Arc::clone(&self.settled));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.stagger {
                let first: u64 = ids.first().map(|k| k.parse().unwrap()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(first * 5))).await;
            }
            if let Some(bad) = &self.fail_on {
                if ids.contains(bad) {
                    return Err(AppError::Internal("boom".into()));
                }
            }
            Ok(ids.iter().map(|k| log(k, self.same_time)).collect())
        }
    }

    fn item_keys(n: usize) -> EventLogKeys {
        EventLogKeys::StudyPlanItemIds((0..n).map(|i| i.to_string()).collect())
    }

    #[tokio::test]
    async fn merges_chunks_in_time_order() {
        let source = Arc::new(NumberedSource::new());
        let aggregator = EventLogAggregator::new(source.clone(), 3);

        let logs = aggregator
            .retrieve(&item_keys(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(logs.len(), 10);
        assert!(logs.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(logs[0].id, 9);
    }

    #[tokio::test]
    async fn identity_keys_use_identity_lookup() {
        let aggregator = EventLogAggregator::new(Arc::new(NumberedSource::new()), 2);
        let keys = EventLogKeys::Identities(
            ["1", "2", "3"]
                .iter()
                .map(|lm| StudyPlanItemIdentity::new("s", "p", *lm))
                .collect(),
        );
        let logs = aggregator.retrieve(&keys, &CancellationToken::new()).await.unwrap();
        assert_eq!(logs.iter().map(|l| l.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn one_failing_chunk_fails_everything() {
        let source = NumberedSource {
            fail_on: Some("7".into()),
            ..NumberedSource::new()
        };
        let aggregator = EventLogAggregator::new(Arc::new(source), 2);

        let err = aggregator
            .retrieve(&item_keys(10), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn cancellation_returns_early() {
        let source = NumberedSource {
            delay: Duration::from_secs(30),
            ..NumberedSource::new()
        };
        let aggregator = EventLogAggregator::new(Arc::new(source), 2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = aggregator.retrieve(&item_keys(6), &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }

    #[tokio::test]
    async fn cancelled_chunk_tasks_still_finish() {
        let source = Arc::new(NumberedSource {
            delay: Duration::from_secs(30),
            ..NumberedSource::new()
        });
        let settled = Arc::clone(&source.settled);
        let aggregator = EventLogAggregator::new(source.clone(), 2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = aggregator.retrieve(&item_keys(6), &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        // every spawned task winds down on its own after the caller is gone
        tokio::time::timeout(Duration::from_secs(5), async {
            while settled.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("chunk tasks did not finish after cancellation");
    }

    #[tokio::test]
    async fn equal_timestamps_keep_chunk_order() {
        let source = NumberedSource {
            same_time: true,
            stagger: true,
            ..NumberedSource::new()
        };
        let aggregator = EventLogAggregator::new(Arc::new(source), 2);

        let logs = aggregator
            .retrieve(&item_keys(9), &CancellationToken::new())
            .await
            .unwrap();

        // later chunks finish first, yet the merge follows key order
        assert_eq!(logs.iter().map(|l| l.id).collect::<Vec<_>>(), (0..9).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn empty_keys_skip_the_source() {
        let source = Arc::new(NumberedSource::new());
        let aggregator = EventLogAggregator::new(source.clone(), 50);
        let logs = aggregator
            .retrieve(&item_keys(0), &CancellationToken::new())
            .await
            .unwrap();
        assert!(logs.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
