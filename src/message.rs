use std::sync::Arc;

use chrono::{DateTime, Utc};

/// The container a log line came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    /// Name as the Docker API reports it, e.g. `/r-scheduler-1`.
    pub name: String,
    /// Image reference as the container was created with, e.g. `rancher/dns:v0.15`.
    pub image: String,
}

impl Container {
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl AsRef<str> for OutputStream {
    fn as_ref(&self) -> &str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// One line of container output.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub container: Arc<Container>,
    pub source: OutputStream,
    pub data: String,
    pub time: DateTime<Utc>,
}

impl LogMessage {
    pub fn new(container: Arc<Container>, source: OutputStream, data: impl Into<String>) -> Self {
        Self {
            container,
            source,
            data: data.into(),
            time: Utc::now(),
        }
    }
}
