// src/state.rs

use std::sync::Arc;

use crate::{
    config::Config,
    repositories::{EventLogSource, QuestionGroupLookup, QuizStore},
    services::{
        aggregator::EventLogAggregator,
        grading::Grader,
        learning_time::{LearningTimeCalculator, SessionLearningTimeCalculator},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QuizStore>,
    pub question_groups: Arc<dyn QuestionGroupLookup>,
    pub aggregator: EventLogAggregator,
    pub learning_time: Arc<dyn LearningTimeCalculator>,
    pub grader: Grader,
    pub config: Config,
}

impl AppState {
    /// Wires every seam to one backing store with the default grader and
    /// learning-time calculator.
    pub fn new<S>(store: Arc<S>, config: Config) -> Self
    where
        S: QuizStore + QuestionGroupLookup + EventLogSource + 'static,
    {
        Self {
            store: store.clone(),
            question_groups: store.clone(),
            aggregator: EventLogAggregator::new(store, config.event_log_chunk_size),
            learning_time: Arc::new(SessionLearningTimeCalculator),
            grader: Grader::default(),
            config,
        }
    }
}
