// src/services/mod.rs

pub mod aggregator;
pub mod attempt_history;
pub mod grading;
pub mod learning_time;
pub mod retry;
pub mod shuffle;
pub mod tracker;
