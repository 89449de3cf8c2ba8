// src/services/retry.rs

use std::collections::HashSet;

use crate::models::quiz::{HierarchyNode, QuestionHierarchy};

/// Outcome of deriving a retry set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Quizzes still to answer, in quiz-set order.
    Retry(Vec<String>),
    AllAnsweredCorrectly,
}

/// Quiz-set ids minus the correctly answered ones, keeping quiz-set order.
pub fn derive_retry_set(quiz_set_ids: &[String], correct_ids: &[String]) -> RetryOutcome {
    let correct: HashSet<&str> = correct_ids.iter().map(String::as_str).collect();
    let remaining: Vec<String> = quiz_set_ids
        .iter()
        .filter(|id| !correct.contains(id.as_str()))
        .cloned()
        .collect();

    if remaining.is_empty() {
        RetryOutcome::AllAnsweredCorrectly
    } else {
        RetryOutcome::Retry(remaining)
    }
}

/// Drops correctly answered questions from the hierarchy. Groups left
/// without children are dropped as well.
pub fn derive_retry_hierarchy(
    hierarchy: &QuestionHierarchy,
    correct_ids: &[String],
) -> QuestionHierarchy {
    let correct: HashSet<&str> = correct_ids.iter().map(String::as_str).collect();

    hierarchy
        .iter()
        .filter_map(|node| match node {
            HierarchyNode::Question { id } => {
                (!correct.contains(id.as_str())).then(|| node.clone())
            }
            HierarchyNode::QuestionGroup { id, children_ids } => {
                let children_ids: Vec<String> = children_ids
                    .iter()
                    .filter(|c| !correct.contains(c.as_str()))
                    .cloned()
                    .collect();
                (!children_ids.is_empty()).then(|| HierarchyNode::QuestionGroup {
                    id: id.clone(),
                    children_ids,
                })
            }
        })
        .collect()
}
