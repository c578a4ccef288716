//! Output and lifecycle event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Atomic unit of runner output; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputChunk {
    pub process_id: Uuid,
    pub data: String,
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
}

impl OutputChunk {
    pub fn new(process_id: Uuid, stream: OutputStream, data: impl Into<String>) -> Self {
        Self {
            process_id,
            data: data.into(),
            timestamp: Utc::now(),
            stream,
        }
    }
}

/// Lifecycle signal, distinct from raw output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEventType {
    /// Runner produced its first output or reported ready
    Started,
    /// Runner was stopped or exited cleanly
    Stopped,
    /// Abnormal exit or adapter failure
    Error { message: String },
    /// No output for the idle threshold
    Idle,
    /// Output resumed after an idle period
    Active,
}

/// A lifecycle event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEvent {
    pub process_id: Uuid,
    #[serde(flatten)]
    pub event: ProcessEventType,
    pub timestamp: DateTime<Utc>,
}

impl ProcessEvent {
    pub fn new(process_id: Uuid, event: ProcessEventType) -> Self {
        Self {
            process_id,
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn started(process_id: Uuid) -> Self {
        Self::new(process_id, ProcessEventType::Started)
    }

    pub fn stopped(process_id: Uuid) -> Self {
        Self::new(process_id, ProcessEventType::Stopped)
    }

    pub fn error(process_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(
            process_id,
            ProcessEventType::Error {
                message: message.into(),
            },
        )
    }

    pub fn idle(process_id: Uuid) -> Self {
        Self::new(process_id, ProcessEventType::Idle)
    }

    pub fn active(process_id: Uuid) -> Self {
        Self::new(process_id, ProcessEventType::Active)
    }
}

/// What subscribers receive on the push channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputMessage {
    Chunk(OutputChunk),
    Event(ProcessEvent),
}

impl OutputMessage {
    pub fn as_chunk(&self) -> Option<&OutputChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::Event(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let id = Uuid::new_v4();
        let event = ProcessEvent::error(id, "boom");
        assert_eq!(event.process_id, id);
        assert!(matches!(event.event, ProcessEventType::Error { ref message } if message == "boom"));
    }

    #[test]
    fn test_output_message_serialization() {
        let id = Uuid::new_v4();
        let message = OutputMessage::Chunk(OutputChunk::new(id, OutputStream::Stdout, "hi"));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "chunk");
        assert_eq!(json["data"], "hi");
        assert_eq!(json["stream"], "stdout");
    }
}
