//! Bus message shapes — requests consumed from the bus and the replies
//! published back. The transport delivers JSON; field names follow the
//! platform's camelCase wire convention.

use serde::{Deserialize, Serialize};

/// Request to bulk-index a data directory or a single JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexRequest {
    pub index_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_file: Option<String>,
    /// Inline engine mapping overriding the strategy-generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_mapping: Option<serde_json::Value>,
    #[serde(default)]
    pub recreate_index: bool,
    /// When set, the whole data directory is walked instead of one file.
    #[serde(default)]
    pub create_from_json_data_dir: bool,
    pub app_id: String,
    pub auth_key: String,
    #[serde(default)]
    pub message_id: String,
}

/// Nearest-neighbour query against one logical index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIndexRequest {
    pub index_name: String,
    pub query_text: String,
    /// `content`, `question` or `summary`; absent means weighted multi-field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_mode: Option<String>,
    /// Per-field weight overrides for multi-field search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_weights: Option<std::collections::HashMap<String, f32>>,
    pub app_id: String,
    pub auth_key: String,
    #[serde(default)]
    pub routing_key: String,
}

/// Snapshot pass-through request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub snapshot_repo: String,
    pub snapshot_name: String,
    #[serde(default)]
    pub indices: Vec<String>,
    pub app_id: String,
    pub auth_key: String,
}

/// Uniform handler outcome published on the reply endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultObj {
    pub success: bool,
    pub message: String,
}

impl ResultObj {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One projected query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub input: String,
    pub output: String,
}

/// Reply for `queryIndexResult{appId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIndexReply {
    pub success: bool,
    pub message: String,
    pub query_results: Vec<QueryHit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_index_request_wire_shape() {
        let req: CreateIndexRequest = serde_json::from_str(
            r#"{
                "indexName": "documents",
                "recreateIndex": true,
                "createFromJsonDataDir": true,
                "appId": "nm-01",
                "authKey": "k",
                "messageId": "m-7"
            }"#,
        )
        .unwrap();
        assert_eq!(req.index_name, "documents");
        assert!(req.recreate_index);
        assert!(req.json_file.is_none());
    }

    #[test]
    fn test_query_reply_round_trip() {
        let reply = QueryIndexReply {
            success: true,
            message: "2 hits".into(),
            query_results: vec![QueryHit {
                input: "q".into(),
                output: "a".into(),
            }],
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["queryResults"][0]["output"], "a");
    }
}
