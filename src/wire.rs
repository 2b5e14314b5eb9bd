//! Forward protocol records.
//!
//! Each record is written as a JSON array `[tag, epoch_seconds, fields]`
//! with no framing around it. The collector reads back-to-back values off
//! the stream.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::message::LogMessage;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Seconds since the epoch, truncated to 32 bits.
pub fn unix_timestamp(time: DateTime<Utc>) -> i32 {
    time.timestamp() as i32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct RecordFields {
    #[serde(rename = "containerID")]
    pub container_id: String,
    #[serde(rename = "containerName")]
    pub container_name: String,
    pub log: String,
}

impl From<&LogMessage> for RecordFields {
    fn from(message: &LogMessage) -> Self {
        Self {
            container_id: message.container.id.clone(),
            container_name: message.container.name.clone(),
            log: message.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRecord {
    pub tag: String,
    pub timestamp: i32,
    pub fields: RecordFields,
}

impl Serialize for ForwardRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.tag, self.timestamp, &self.fields).serialize(serializer)
    }
}

impl ForwardRecord {
    pub fn new(tag: impl Into<String>, timestamp: i32, fields: RecordFields) -> Self {
        Self {
            tag: tag.into(),
            timestamp,
            fields,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(self)?)
    }
}
