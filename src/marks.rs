use serde::{Deserialize, Serialize};

/// A single student/exam score entry. Identity key is (studentId, examId);
/// `id`, when present, must be unique across the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub student_id: String,
    pub exam_id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

impl MarkRecord {
    pub fn pair_matches(&self, other: &MarkRecord) -> bool {
        self.student_id == other.student_id && self.exam_id == other.exam_id
    }

    /// Shallow merge: present fields of `incoming` overwrite, absent
    /// optional fields are preserved. `score` is always taken from the
    /// incoming record.
    pub fn merge_from(&mut self, incoming: MarkRecord) {
        if incoming.id.is_some() {
            self.id = incoming.id;
        }
        self.student_id = incoming.student_id;
        self.exam_id = incoming.exam_id;
        self.score = incoming.score;
        if incoming.max_score.is_some() {
            self.max_score = incoming.max_score;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeAction {
    Added,
    Updated,
}

impl MergeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeAction::Added => "added",
            MergeAction::Updated => "updated",
        }
    }
}

/// Canonical encoding of a collection: pretty-printed JSON. This exact
/// byte sequence is what the atomic writer verifies and what readers of
/// the primary key observe.
pub fn encode(marks: &[MarkRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(marks)
}

pub fn decode(payload: &str) -> Result<Vec<MarkRecord>, serde_json::Error> {
    serde_json::from_str(payload)
}
