use crate::generation::{GenerationStep, ProgressInfo, StatusKind};
use crate::listing::ContentSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server → client frames on the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    Connect {
        processing_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        processing_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    ProgressUpdate {
        processing_id: Uuid,
        status: StatusKind,
        current_step: Option<GenerationStep>,
        progress_percentage: f64,
        estimated_remaining_seconds: u64,
        timestamp: DateTime<Utc>,
    },
    Completion {
        processing_id: Uuid,
        status: StatusKind,
        generated_content: ContentSummary,
        timestamp: DateTime<Utc>,
    },
    Error {
        processing_id: Uuid,
        status: StatusKind,
        error_message: String,
        error_code: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressMessage {
    pub fn connected(processing_id: Uuid) -> Self {
        Self::Connect {
            processing_id,
            message: "connected to generation progress".into(),
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat(processing_id: Uuid) -> Self {
        Self::Heartbeat {
            processing_id,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(info: &ProgressInfo) -> Self {
        Self::ProgressUpdate {
            processing_id: info.processing_id,
            status: info.status,
            current_step: info.current_step,
            progress_percentage: info.progress_percentage,
            estimated_remaining_seconds: info.estimated_remaining_seconds,
            timestamp: info.updated_at,
        }
    }

    pub fn completion(processing_id: Uuid, generated_content: ContentSummary) -> Self {
        Self::Completion {
            processing_id,
            status: StatusKind::Completed,
            generated_content,
            timestamp: Utc::now(),
        }
    }

    pub fn error(processing_id: Uuid, error_message: String, error_code: &str) -> Self {
        Self::Error {
            processing_id,
            status: StatusKind::Failed,
            error_message,
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Heartbeat { .. } => "heartbeat",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::Completion { .. } => "completion",
            Self::Error { .. } => "error",
        }
    }
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_by_type() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(ProgressMessage::error(id, "boom".into(), "AI_SERVICE_ERROR"))
            .unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_code"], "AI_SERVICE_ERROR");
        assert_eq!(value["processing_id"], id.to_string());
    }

    #[test]
    fn client_heartbeat_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
