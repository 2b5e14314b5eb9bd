//! Docker client module using bollard.
//!
//! The client talks to the local daemon (Unix socket on Linux/macOS, named
//! pipe on Windows). Failing to reach it is reported to the caller instead
//! of aborting.

use bollard::Docker;
use bollard::models::{ContainerSummary, EventMessage, EventMessageTypeEnum};

use crate::message::Container;

pub fn connect_docker() -> Result<Docker, bollard::errors::Error> {
    Docker::connect_with_local_defaults()
}

/// Builds a container description from a `docker ps` entry.
pub fn container_from_summary(summary: &ContainerSummary) -> Option<Container> {
    let id = summary.id.as_deref()?;
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(String::as_str)
        .unwrap_or(id);
    let image = summary.image.as_deref().unwrap_or_default();
    Some(Container::new(id, name, image))
}

/// Builds a container description from a container `start` event.
///
/// Returns `None` for every other event.
pub fn started_container(event: &EventMessage) -> Option<Container> {
    if event.typ != Some(EventMessageTypeEnum::CONTAINER) || event.action.as_deref() != Some("start")
    {
        return None;
    }
    let actor = event.actor.as_ref()?;
    let id = actor.id.as_deref()?;
    let attributes = actor.attributes.as_ref();
    let attribute = |key: &str| {
        attributes
            .and_then(|attrs| attrs.get(key))
            .map(String::as_str)
    };
    // Event attributes carry the bare name; the API reports it with a `/`.
    let name = format!("/{}", attribute("name").unwrap_or(id).trim_start_matches('/'));
    Some(Container::new(id, name, attribute("image").unwrap_or_default()))
}

/// When the event happened, in seconds since the UNIX epoch.
pub fn event_time(event: &EventMessage) -> Option<i64> {
    event
        .time
        .or_else(|| event.time_nano.map(|nanos| nanos / 1_000_000_000))
}
