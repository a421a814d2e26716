use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single insight. Models return either a bare sentence or a summary/explanation pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Finding {
    Text(String),
    Detailed {
        #[serde(default)]
        summary: String,
        #[serde(default)]
        explanation: String,
    },
}

impl Finding {
    pub fn summary(&self) -> &str {
        match self {
            Finding::Text(text) => text,
            Finding::Detailed { summary, .. } => summary,
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            Finding::Text(_) => "",
            Finding::Detailed { explanation, .. } => explanation,
        }
    }
}

/// A validated model response, tagged with the community it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub title: String,
    pub summary: String,
    pub findings: Vec<Finding>,
    pub rating: f64,
    pub rating_explanation: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub entities: Vec<String>,
    /// Any additional keys the model returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommunityReport {
    /// Markdown rendering: title, summary, then one `##` section per finding.
    pub fn to_text_output(&self) -> String {
        let sections = self
            .findings
            .iter()
            .map(|finding| format!("## {}\n\n{}", finding.summary(), finding.explanation()))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("# {}\n\n{}\n\n{}", self.title, self.summary, sections)
    }
}

/// Reports in task completion order, which is not community order. Callers that need a
/// stable order should sort `structured_output` themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportsResult {
    pub output: Vec<String>,
    pub structured_output: Vec<CommunityReport>,
}
