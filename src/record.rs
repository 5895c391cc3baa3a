use crate::config::Number;
use serde::{Deserialize, Serialize};

/// One parsed test case. Absent sections are empty strings, never missing.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TestCaseRecord {
    pub title: String,
    pub description: String,
    pub steps: String,
    pub expected_outcome: String,
}

impl TestCaseRecord {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        steps: impl Into<String>,
        expected_outcome: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            steps: steps.into(),
            expected_outcome: expected_outcome.into(),
        }
    }

    /// True when every field is empty.
    pub fn is_blank(&self) -> bool {
        self.title.is_empty()
            && self.description.is_empty()
            && self.steps.is_empty()
            && self.expected_outcome.is_empty()
    }
}

/// A ranked neighbor returned by the vector index.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SearchHit {
    pub offset: usize,
    /// Squared L2 distance to the query.
    pub distance: Number,
    pub metadata: String,
}
