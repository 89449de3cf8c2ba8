// src/models/mod.rs

pub mod attempt_history;
pub mod event_log;
pub mod progression;
pub mod quiz;
pub mod shuffled_quiz_set;
