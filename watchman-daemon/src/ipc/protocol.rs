//! Wire messages exchanged over the control socket.
//!
//! Framing is one JSON document per line in both directions.

use crate::task::BackupTask;
use serde::{Deserialize, Serialize};

/// Client → daemon command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    #[serde(rename = "ADD")]
    Add(AddPayload),

    #[serde(rename = "LIST")]
    List,

    #[serde(rename = "DELETE")]
    Delete { name: String },

    #[serde(rename = "STOP")]
    Stop { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPayload {
    pub name: String,
    pub source_path: String,
    pub target_path: String,

    /// Minute interval (`"30"`) or six-field cron expression
    pub schedule: String,
}

/// Daemon → client reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<BackupTask>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_tasks(tasks: Vec<BackupTask>) -> Self {
        Self {
            success: true,
            data: Some(tasks),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
