// src/models/quiz.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Quiz families understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuizKind {
    /// Multiple choice, one correct option.
    #[serde(rename = "MCQ")]
    Mcq,
    /// Multiple answer.
    #[serde(rename = "MAQ")]
    Maq,
    /// Manual input: option 1 is "true", option 2 is "false".
    #[serde(rename = "MIQ")]
    Miq,
    /// Fill in the blank.
    #[serde(rename = "FIB")]
    Fib,
    /// Pair of words.
    #[serde(rename = "POW")]
    Pow,
    /// Term and definition.
    #[serde(rename = "TAD")]
    Tad,
    /// Ordering.
    #[serde(rename = "ORD")]
    Ord,
    /// Essay.
    #[serde(rename = "ESQ")]
    Esq,
}

impl QuizKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizKind::Mcq => "MCQ",
            QuizKind::Maq => "MAQ",
            QuizKind::Miq => "MIQ",
            QuizKind::Fib => "FIB",
            QuizKind::Pow => "POW",
            QuizKind::Tad => "TAD",
            QuizKind::Ord => "ORD",
            QuizKind::Esq => "ESQ",
        }
    }

    /// Kinds whose options are displayed in a seed-derived order.
    /// MIQ keeps its true/false convention and blanks are position-aligned.
    pub fn has_shuffled_options(&self) -> bool {
        matches!(self, QuizKind::Mcq | QuizKind::Maq | QuizKind::Ord)
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("QUIZ_TYPE_") {
            "MCQ" => Ok(QuizKind::Mcq),
            "MAQ" => Ok(QuizKind::Maq),
            "MIQ" => Ok(QuizKind::Miq),
            "FIB" => Ok(QuizKind::Fib),
            "POW" => Ok(QuizKind::Pow),
            "TAD" => Ok(QuizKind::Tad),
            "ORD" => Ok(QuizKind::Ord),
            "ESQ" => Ok(QuizKind::Esq),
            other => Err(AppError::Internal(format!("unknown quiz kind '{}'", other))),
        }
    }
}

/// Authored content: the raw editor payload plus a rendered copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub rendered: String,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            rendered: text,
        }
    }

    /// Text used for answer comparison.
    pub fn text(&self) -> &str {
        &self.raw
    }
}

/// Per-option flag. Unknown flags are kept so re-serialization is lossless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionConfig {
    #[serde(rename = "QUIZ_OPTION_CONFIG_PARTIAL_CREDIT")]
    PartialCredit,
    #[serde(rename = "QUIZ_OPTION_CONFIG_CASE_SENSITIVE")]
    CaseSensitive,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub content: RichText,
    #[serde(default)]
    pub correctness: bool,
    #[serde(default)]
    pub configs: Vec<OptionConfig>,
    /// Groups fill-in-blank alternatives that answer the same blank.
    #[serde(default)]
    pub label: String,
    /// Stable identity used by ordering quizzes.
    #[serde(default)]
    pub key: String,
}

impl QuizOption {
    pub fn has_partial_credit(&self) -> bool {
        self.configs.contains(&OptionConfig::PartialCredit)
    }
}

/// One blank of a fill-in-blank family quiz with every accepted spelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Blank {
    pub alternatives: Vec<QuizOption>,
}

impl Blank {
    /// Canonical answer shown back to the student.
    pub fn canonical_text(&self) -> String {
        self.alternatives
            .first()
            .map(|o| o.content.text().trim().to_string())
            .unwrap_or_default()
    }

    pub fn accepts(&self, submitted: &str) -> bool {
        let submitted = submitted.trim();
        self.alternatives
            .iter()
            .any(|alt| alt.content.text().trim() == submitted)
    }

    pub fn has_partial_credit(&self) -> bool {
        self.alternatives
            .first()
            .map(QuizOption::has_partial_credit)
            .unwrap_or(false)
    }
}

/// Canonical question, read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub quiz_id: String,
    pub external_id: String,
    pub kind: QuizKind,
    pub question: RichText,
    pub explanation: RichText,

    /// Options as stored. Decoded on demand so a malformed row only
    /// affects the quiz it belongs to.
    pub options: serde_json::Value,

    pub point: i32,
    pub question_group_id: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    pub fn decode_options(&self) -> Result<Vec<QuizOption>, serde_json::Error> {
        serde_json::from_value(self.options.clone())
    }

    /// Groups options into blanks by label, in order of first appearance.
    /// Options without a label are blanks of their own.
    pub fn blanks(&self) -> Result<Vec<Blank>, serde_json::Error> {
        let mut blanks: Vec<(String, Blank)> = Vec::new();
        for option in self.decode_options()? {
            if !option.label.is_empty() {
                if let Some((_, blank)) = blanks.iter_mut().find(|(l, _)| *l == option.label) {
                    blank.alternatives.push(option);
                    continue;
                }
            }
            blanks.push((
                option.label.clone(),
                Blank {
                    alternatives: vec![option],
                },
            ));
        }
        Ok(blanks.into_iter().map(|(_, b)| b).collect())
    }

    /// Point awarded for an accepted answer. Negative authoring values award nothing.
    pub fn award(&self) -> u32 {
        u32::try_from(self.point).unwrap_or(0)
    }
}

/// Option as shown to a student: correctness stays on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicOption {
    pub content: RichText,
    pub configs: Vec<OptionConfig>,
    pub label: String,
    pub key: String,
}

impl From<&QuizOption> for PublicOption {
    fn from(option: &QuizOption) -> Self {
        Self {
            content: option.content.clone(),
            configs: option.configs.clone(),
            label: option.label.clone(),
            key: option.key.clone(),
        }
    }
}

/// DTO for sending a quiz to the client (excludes correctness and explanation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuiz {
    pub quiz_id: String,
    pub external_id: String,
    pub kind: QuizKind,
    pub question: RichText,
    /// Public options in display order, or the stored value untouched
    /// when it could not be decoded.
    pub options: serde_json::Value,
    pub point: i32,
    pub question_group_id: Option<String>,
}

/// One node of a quiz set's question hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HierarchyNode {
    #[serde(rename = "QUESTION")]
    Question { id: String },
    #[serde(rename = "QUESTION_GROUP")]
    QuestionGroup {
        id: String,
        #[serde(default)]
        children_ids: Vec<String>,
    },
}

impl HierarchyNode {
    pub fn id(&self) -> &str {
        match self {
            HierarchyNode::Question { id } => id,
            HierarchyNode::QuestionGroup { id, .. } => id,
        }
    }
}

pub type QuestionHierarchy = Vec<HierarchyNode>;

/// Ordered, versioned collection of quizzes of one learning material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSet {
    pub quiz_set_id: String,
    pub learning_material_id: String,
    pub quiz_external_ids: Vec<String>,
    pub question_hierarchy: QuestionHierarchy,
    pub status: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Metadata decorating grouped questions on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub question_group_id: String,
    pub learning_material_id: String,
    pub name: String,
    pub description: String,
    pub rich_description: RichText,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quiz_with_options(options: serde_json::Value) -> Quiz {
        Quiz {
            quiz_id: "q1".into(),
            external_id: "ext-1".into(),
            kind: QuizKind::Fib,
            question: RichText::plain("?"),
            explanation: RichText::default(),
            options,
            point: 3,
            question_group_id: None,
            created_at: None,
        }
    }

    #[test]
    fn kind_parses_with_and_without_prefix() {
        assert_eq!("MCQ".parse::<QuizKind>().unwrap(), QuizKind::Mcq);
        assert_eq!("QUIZ_TYPE_ORD".parse::<QuizKind>().unwrap(), QuizKind::Ord);
        assert!("QUIZ_TYPE_XYZ".parse::<QuizKind>().is_err());
    }

    #[test]
    fn blanks_group_alternatives_by_label() {
        let quiz = quiz_with_options(json!([
            {"content": {"raw": "cat"}, "label": "A", "configs": ["QUIZ_OPTION_CONFIG_PARTIAL_CREDIT"]},
            {"content": {"raw": "dog"}, "label": "B"},
            {"content": {"raw": "kitty"}, "label": "A"},
            {"content": {"raw": "x"}},
            {"content": {"raw": "y"}}
        ]));

        let blanks = quiz.blanks().unwrap();
        assert_eq!(blanks.len(), 4);
        assert_eq!(blanks[0].alternatives.len(), 2);
        assert!(blanks[0].accepts("  kitty "));
        assert!(blanks[0].has_partial_credit());
        assert!(!blanks[1].has_partial_credit());
        assert_eq!(blanks[3].canonical_text(), "y");
    }

    #[test]
    fn unknown_option_configs_survive() {
        let option: QuizOption = serde_json::from_value(json!({
            "content": {"raw": "a"},
            "configs": ["SOMETHING_NEW", "QUIZ_OPTION_CONFIG_PARTIAL_CREDIT"]
        }))
        .unwrap();
        assert_eq!(option.configs[0], OptionConfig::Other("SOMETHING_NEW".into()));
        assert!(option.has_partial_credit());
    }

    #[test]
    fn negative_points_award_nothing() {
        let mut quiz = quiz_with_options(json!([]));
        quiz.point = -2;
        assert_eq!(quiz.award(), 0);
    }

    #[test]
    fn hierarchy_round_trips_through_tagged_json() {
        let raw = json!([
            {"type": "QUESTION", "id": "a"},
            {"type": "QUESTION_GROUP", "id": "g", "children_ids": ["b", "c"]}
        ]);
        let h: QuestionHierarchy = serde_json::from_value(raw).unwrap();
        assert_eq!(h[1].id(), "g");
    }
}
