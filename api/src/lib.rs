mod error;
mod handlers;
mod server;

pub use error::{ApiError, ApiResult};
pub use handlers::{handle, AppState};
pub use server::Server;

use serde::{Deserialize, Serialize};

use storage::{EngineStats, FileEntry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub max_requests: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Write { file: String, data: String },
    Read { file: String },
    List {
        #[serde(default)]
        prefix: String,
    },
    Complete { prefix: String },
    Delete { file: String },
    AccessPair { source: String, target: String },
    Tag { file: String, key: String },
    SearchKey { key: String },
    SuggestKeys { prefix: String },
    SystemKeys,
    Decay,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    File {
        file: String,
    },
    Written {
        file: String,
        address: u64,
        size: u64,
    },
    Content {
        file: String,
        content: String,
        source: storage::ReadSource,
        predictions: Vec<String>,
    },
    Listing {
        files: Vec<FileEntry>,
    },
    Names {
        files: Vec<String>,
    },
    Keywords {
        keywords: Vec<String>,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Decayed {
        removed: usize,
    },
    Stats(EngineStats),
    Failure {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => format!(
                r#"{{"status":"error","message":"failed to encode response: {}","kind":"Internal"}}"#,
                e.to_string().replace('"', "'")
            ),
        }
    }
}
