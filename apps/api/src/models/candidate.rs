use serde::{Deserialize, Serialize};

/// How to reach the candidate. Name is optional because uploads only require an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContact {
    pub name: Option<String>,
    pub email: String,
}

impl CandidateContact {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            email: email.into(),
        }
    }

    /// Name to greet the candidate with, lowercased for the house email style.
    pub fn greeting_name(&self) -> String {
        self.name
            .as_deref()
            .map(|n| n.trim().to_lowercase())
            .unwrap_or_else(|| "there".to_string())
    }
}
