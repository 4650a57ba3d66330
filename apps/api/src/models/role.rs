use serde::{Deserialize, Serialize};

/// A hiring role and the requirement statements a resume is assessed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub title: String,
    /// Free-text requirement statements, in catalog order.
    #[serde(default)]
    pub requirements: Vec<String>,
}
