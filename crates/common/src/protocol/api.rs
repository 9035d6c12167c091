// Request and response bodies for the document service REST API.

use serde::{Deserialize, Serialize};

use crate::types::{ChapterId, ConsistencyIssue, ProjectId};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Body of `PUT /chapters/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterUpdate {
    pub content: String,
}

/// Body of `POST /writing/continue`. The response is a raw text stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContinueRequest {
    pub project_id: ProjectId,
    pub chapter_id: ChapterId,
    /// Trailing window of the chapter preceding the insertion point.
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// Body of `POST /writing/rewrite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewriteRequest {
    pub project_id: ProjectId,
    pub text: String,
    pub instruction: String,
}

/// Response of the non-streaming writing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WritingResponse {
    pub content: String,
}

/// Response of `POST /consistency/{id}/check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsistencyCheckResponse {
    pub issues: Vec<ConsistencyIssue>,
}

/// Body of `POST /consistency/{id}/fix`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixRequest {
    pub quote: String,
    pub description: String,
    pub suggestion: String,
}

/// Body of `POST /chapters/{id}/snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Response of `POST /projects/{id}/generate-bible`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSubmission {
    pub task_id: String,
    #[serde(default)]
    pub message: String,
}

/// Error body returned by the service on non-success statuses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Human-readable detail, flattening structured validation errors.
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_request_omits_missing_instruction() {
        let request = ContinueRequest {
            project_id: 1,
            chapter_id: 2,
            context: "ctx".into(),
            instruction: None,
        };
        let encoded = serde_json::to_value(&request).expect("request should encode");
        assert_eq!(encoded, serde_json::json!({"project_id":1,"chapter_id":2,"context":"ctx"}));
    }

    #[test]
    fn error_body_flattens_structured_detail() {
        let plain: ErrorBody =
            serde_json::from_str(r#"{"detail":"Chapter not found"}"#).expect("decode");
        assert_eq!(plain.message(), "Chapter not found");

        let structured: ErrorBody =
            serde_json::from_str(r#"{"detail":[{"loc":["body"],"msg":"field required"}]}"#)
                .expect("decode");
        assert!(structured.message().contains("field required"));
    }
}
