// src/models/shuffled_quiz_set.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::quiz::{QuestionHierarchy, QuizKind};

/// Seed of one attempt. Stored as a zero-padded 19-digit decimal string
/// so it survives any store that cannot hold a full 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Seed(i64);

impl Seed {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Seed captured from the wall clock in nanoseconds.
    pub fn from_clock() -> Self {
        let now = chrono::Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().wrapping_mul(1_000));
        Self(nanos)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:019}", self.0)
    }
}

impl FromStr for Seed {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Seed)
    }
}

impl TryFrom<String> for Seed {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Seed> for String {
    fn from(seed: Seed) -> Self {
        seed.to_string()
    }
}

/// Normalized result of grading one submitted quiz.
/// Indices are 1-based and refer to the option order the student saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// External id of the answered quiz.
    pub quiz_id: String,
    pub quiz_type: QuizKind,
    #[serde(default)]
    pub selected_index: Vec<u32>,
    #[serde(default)]
    pub correct_index: Vec<u32>,
    #[serde(default)]
    pub filled_text: Vec<String>,
    #[serde(default)]
    pub correct_text: Vec<String>,
    #[serde(default)]
    pub submitted_keys: Vec<String>,
    #[serde(default)]
    pub correct_keys: Vec<String>,
    /// One flag per sub-answer.
    pub correctness: Vec<bool>,
    pub is_accepted: bool,
    pub is_all_correct: bool,
    pub point: u32,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl AnswerRecord {
    pub fn new(quiz_id: impl Into<String>, quiz_type: QuizKind) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            quiz_type,
            selected_index: Vec::new(),
            correct_index: Vec::new(),
            filled_text: Vec::new(),
            correct_text: Vec::new(),
            submitted_keys: Vec::new(),
            correct_keys: Vec::new(),
            correctness: Vec::new(),
            is_accepted: false,
            is_all_correct: false,
            point: 0,
            submitted_at: chrono::Utc::now(),
        }
    }
}

/// One attempt of a student on a quiz set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffledQuizSet {
    pub shuffled_quiz_set_id: String,
    pub original_quiz_set_id: String,
    pub student_id: String,
    pub study_plan_id: String,
    pub learning_material_id: String,
    pub session_id: String,
    pub quiz_external_ids: Vec<String>,
    pub question_hierarchy: QuestionHierarchy,
    pub random_seed: Seed,
    pub total_correctness: i32,
    pub submission_history: Vec<AnswerRecord>,
    /// Set when this attempt retries an earlier one.
    pub original_shuffle_quiz_set_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ShuffledQuizSet {
    pub fn is_retry(&self) -> bool {
        self.original_shuffle_quiz_set_id.is_some()
    }
}

/// Slice of a shuffled quiz set. `from` is the 1-based position of the
/// first id in `quiz_external_ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShuffledQuizSetPage {
    pub shuffled_quiz_set_id: String,
    pub learning_material_id: String,
    pub random_seed: Seed,
    pub from: i64,
    pub quiz_external_ids: Vec<String>,
    pub total_quizzes: i64,
}

impl ShuffledQuizSetPage {
    /// Pairs each id on the page with its position in the full set.
    pub fn positioned(&self) -> impl Iterator<Item = (i64, &str)> {
        self.quiz_external_ids
            .iter()
            .enumerate()
            .map(move |(i, id)| (self.from + i as i64, id.as_str()))
    }
}

/// Everything the grading path needs to know about a set before writing
/// one answer into it.
#[derive(Debug, Clone)]
pub struct CorrectnessInfo {
    pub shuffled_quiz_set_id: String,
    pub student_id: String,
    pub study_plan_id: String,
    pub learning_material_id: String,
    pub random_seed: Seed,
    /// 1-based position of the answered quiz in the set.
    pub quiz_index: i64,
    pub total_correctness: i32,
    pub quiz_external_ids: Vec<String>,
    pub submission_history: Vec<AnswerRecord>,
    pub original_shuffle_quiz_set_id: Option<String>,
}

/// First/highest score ratchet applied after a completing submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessUpdate {
    pub student_id: String,
    pub study_plan_id: String,
    pub learning_material_id: String,
    pub score: i32,
}

/// The single write issued for one submitted answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionUpdate {
    pub shuffled_quiz_set_id: String,
    pub total_correctness: i32,
    pub submission_history: Vec<AnswerRecord>,
    pub completeness: Option<CompletenessUpdate>,
}

/// One sub-answer as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmittedAnswer {
    SelectedIndex(u32),
    FilledText(String),
    SubmittedKey(String),
}
