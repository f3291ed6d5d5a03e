//! Request and response bodies understood by the proxy

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model family that requires an arkose token. Matched as a substring so
/// variants such as `gpt-4-code-interpreter` are covered too.
pub const ARKOSE_MODEL_MARKER: &str = "gpt-4";

const DEFAULT_ROLE: &str = "user";

pub fn requires_arkose(model: &str) -> bool {
    model.contains(ARKOSE_MODEL_MARKER)
}

/// Body of `POST /api/conversation`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub parent_message_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_min: Option<i64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub history_and_training_disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arkose_token: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_ids: Vec<String>,

    /// Fields the proxy does not interpret, forwarded untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Give every turn an id and a role. Existing ids are kept as they are.
    pub fn normalize_messages(&mut self) {
        for message in &mut self.messages {
            if message.id.is_empty() {
                message.id = uuid::Uuid::new_v4().to_string();
            }
            if message.author.role.is_empty() {
                message.author.role = DEFAULT_ROLE.to_string();
            }
        }
    }

    pub fn requires_arkose(&self) -> bool {
        requires_arkose(&self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub author: Author,

    #[serde(default)]
    pub content: Content,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Author {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(default)]
    pub content_type: String,

    #[serde(default)]
    pub parts: Vec<Value>,
}

/// Attachment details sent with code-interpreter turns
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /files`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub file_name: String,
    pub file_size: u64,
    pub use_case: String,
}

impl CreateFileRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("file_name is required".to_string());
        }
        if self.file_size == 0 {
            return Err("file_size must be greater than zero".to_string());
        }
        if self.use_case.trim().is_empty() {
            return Err("use_case is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub file_id: String,
}

/// Body of `POST /process_upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessUploadRequest {
    pub file_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ProcessUploadRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.file_id.trim().is_empty() {
            return Err("file_id is required".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("file_name is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn marker_matches_family_variants() {
        assert!(requires_arkose("gpt-4"));
        assert!(requires_arkose("gpt-4-code-interpreter"));
        assert!(requires_arkose("gpt-4-browsing"));
        assert!(!requires_arkose("gpt-3.5"));
        assert!(!requires_arkose("text-davinci-002-render-sha"));
        assert!(!requires_arkose("GPT-4"));
    }

    #[test]
    fn normalize_fills_ids_and_roles() {
        let mut request: ChatRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [
                {"content": {"content_type": "text", "parts": ["hi"]}},
                {"id": "keep-me", "author": {"role": "assistant"}, "content": {"content_type": "text", "parts": []}},
                {"content": {"content_type": "text", "parts": ["again"]}}
            ]
        }))
        .unwrap();

        request.normalize_messages();

        assert!(request.messages.iter().all(|m| !m.id.is_empty() && !m.author.role.is_empty()));
        assert_eq!(request.messages[0].author.role, "user");
        assert_eq!(request.messages[1].id, "keep-me");
        assert_eq!(request.messages[1].author.role, "assistant");

        let ids: HashSet<_> = request.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn normalize_is_stable_once_assigned() {
        let mut request = ChatRequest {
            messages: vec![ChatMessage::default()],
            ..Default::default()
        };
        request.normalize_messages();
        let assigned = request.messages[0].id.clone();
        request.normalize_messages();
        assert_eq!(request.messages[0].id, assigned);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let request: ChatRequest = serde_json::from_value(json!({
            "action": "next",
            "model": "gpt-3.5",
            "parent_message_id": "p1",
            "force_paragen": false,
            "messages": []
        }))
        .unwrap();

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["force_paragen"], json!(false));
        assert_eq!(encoded["parent_message_id"], json!("p1"));
        assert!(encoded.get("arkose_token").is_none());
        assert!(encoded.get("conversation_id").is_none());
        assert!(encoded.get("history_and_training_disabled").is_none());
    }

    #[test]
    fn file_requests_validate() {
        let ok = CreateFileRequest {
            file_name: "main.dart.js".to_string(),
            file_size: 42,
            use_case: "ace_upload".to_string(),
        };
        assert!(ok.validate().is_ok());
        assert!(CreateFileRequest { file_size: 0, ..ok.clone() }.validate().is_err());
        assert!(CreateFileRequest { file_name: " ".to_string(), ..ok }.validate().is_err());

        let upload = ProcessUploadRequest {
            file_id: String::new(),
            file_name: "a.csv".to_string(),
            conversation_id: None,
        };
        assert!(upload.validate().is_err());
    }
}
