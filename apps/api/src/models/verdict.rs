use std::fmt;

use serde::{Deserialize, Serialize};

/// Binary outcome of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Selected,
    Rejected,
}

impl Decision {
    pub fn is_selected(self) -> bool {
        matches!(self, Decision::Selected)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Selected => f.write_str("SELECTED"),
            Decision::Rejected => f.write_str("REJECTED"),
        }
    }
}

/// Optional structured fields the model may return alongside its decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictAttributes {
    #[serde(default)]
    pub matching_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
}

/// Structured result of assessing one resume against one role.
/// Produced once per application and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub rationale: String,
    #[serde(default)]
    pub attributes: VerdictAttributes,
}

impl Verdict {
    pub fn is_selected(&self) -> bool {
        self.decision.is_selected()
    }
}
