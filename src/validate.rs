use std::collections::HashSet;

use serde::Serialize;

use crate::marks::MarkRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingStudentId,
    MissingExamId,
    EmptyId,
    DuplicateId,
    DuplicatePair,
    NegativeScore,
    ScoreAboveMax,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    fn at(index: usize, code: IssueCode, message: String) -> Self {
        Self {
            index: Some(index),
            code,
            message,
        }
    }
}

/// Full scan of the collection invariants. Never short-circuits: every
/// violation in the input is reported, so a caller sees the complete
/// picture in one pass. Side-effect free.
pub fn validate_marks(marks: &[MarkRecord]) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();

    for (index, mark) in marks.iter().enumerate() {
        if mark.student_id.is_empty() {
            issues.push(Issue::at(
                index,
                IssueCode::MissingStudentId,
                format!("mark {index}: missing studentId"),
            ));
        }
        if mark.exam_id.is_empty() {
            issues.push(Issue::at(
                index,
                IssueCode::MissingExamId,
                format!("mark {index}: missing examId"),
            ));
        }

        if let Some(id) = mark.id.as_deref() {
            if id.is_empty() {
                issues.push(Issue::at(
                    index,
                    IssueCode::EmptyId,
                    format!("mark {index}: empty id"),
                ));
            } else if !seen_ids.insert(id) {
                issues.push(Issue::at(
                    index,
                    IssueCode::DuplicateId,
                    format!("duplicate mark id: {id}"),
                ));
            }
        }

        let pair = (mark.student_id.as_str(), mark.exam_id.as_str());
        if !seen_pairs.insert(pair) {
            issues.push(Issue::at(
                index,
                IssueCode::DuplicatePair,
                format!(
                    "duplicate: student {} in exam {}",
                    mark.student_id, mark.exam_id
                ),
            ));
        }

        if mark.score < 0.0 {
            issues.push(Issue::at(
                index,
                IssueCode::NegativeScore,
                format!("mark {index}: negative score"),
            ));
        }
        if let Some(max) = mark.max_score {
            if mark.score > max {
                issues.push(Issue::at(
                    index,
                    IssueCode::ScoreAboveMax,
                    format!("mark {index}: score {} exceeds max {max}", mark.score),
                ));
            }
        }
    }

    issues
}
