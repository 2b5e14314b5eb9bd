//! Docker log source.
//!
//! Follows the output of every running container and of every container
//! started later, and feeds it chunk by chunk into the adapter's channel.
//! The source owns every sender: once it returns, the channel closes and
//! the adapter finishes.

pub mod docker;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::query_parameters::{
    EventsOptionsBuilder, ListContainersOptionsBuilder, LogsOptions, LogsOptionsBuilder,
};
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::{AbortHandle, JoinSet};

use crate::message::{Container, LogMessage, OutputStream};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Messages the channel between source and adapter can hold.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Container IDs or names whose output is never read.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SourceConfig {
    /// Entries match a container's name, with or without the leading `/`,
    /// or a prefix of its ID.
    pub fn excludes(&self, container: &Container) -> bool {
        let name = container.name.trim_start_matches('/');
        self.exclude.iter().any(|entry| {
            entry.trim_start_matches('/') == name || container.id.starts_with(entry.as_str())
        })
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
}

/// Converts one chunk of container output into a message.
///
/// Returns `None` for stdin echoes and empty chunks.
pub fn message_from_output(container: &Arc<Container>, output: LogOutput) -> Option<LogMessage> {
    let (source, bytes) = match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            (OutputStream::Stdout, message)
        }
        LogOutput::StdErr { message } => (OutputStream::Stderr, message),
        LogOutput::StdIn { .. } => return None,
    };
    let text = String::from_utf8_lossy(&bytes);
    let line = text.strip_suffix('\n').unwrap_or(&*text);
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    Some(LogMessage::new(Arc::clone(container), source, line))
}

/// Where a follower starts reading a container's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// Only output written from now on.
    Now,
    /// Everything written since the given UNIX time, in seconds.
    Since(i64),
}

pub fn logs_options(start: StartAt) -> LogsOptions {
    let builder = LogsOptionsBuilder::new()
        .follow(true)
        .stdout(true)
        .stderr(true);
    match start {
        StartAt::Now => builder.tail("0").build(),
        StartAt::Since(secs) => builder
            .tail("all")
            .since(secs.clamp(0, i32::MAX.into()) as i32)
            .build(),
    }
}

async fn follow(
    docker: Docker,
    container: Container,
    options: LogsOptions,
    tx: Sender<LogMessage>,
) {
    let container = Arc::new(container);
    debug!("Following {} ({})", container.name, container.image);

    let mut stream = Box::pin(docker.logs(&container.id, Some(options)));
    while let Some(output) = stream.next().await {
        match output {
            Ok(output) => {
                let Some(message) = message_from_output(&container, output) else {
                    continue;
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Log stream of {} failed: {e}", container.name);
                break;
            }
        }
    }

    debug!("Stopped following {}", container.name);
}

/// The follower task of every container being read.
///
/// A container has at most one follower. Starting a new one aborts the
/// previous one, and a follower that ends only forgets its container if it
/// has not been replaced in the meantime.
struct Followers {
    tasks: JoinSet<()>,
    by_container: HashMap<String, AbortHandle>,
}

impl Followers {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            by_container: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.by_container.len()
    }

    fn is_following(&self, id: &str) -> bool {
        self.by_container.contains_key(id)
    }

    fn start<F>(&mut self, id: String, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        if let Some(previous) = self.by_container.insert(id, handle) {
            previous.abort();
        }
    }

    /// Waits for the next follower to end, whether it finished, panicked
    /// or was aborted. Returns `None` when no follower is left.
    async fn join_next(&mut self) -> Option<()> {
        let task = match self.tasks.join_next_with_id().await? {
            Ok((task, ())) => task,
            Err(e) => {
                if e.is_panic() {
                    warn!("Log follower panicked: {e}");
                }
                e.id()
            }
        };
        self.by_container.retain(|_, handle| handle.id() != task);
        Some(())
    }

    fn abort_all(&mut self) {
        self.tasks.abort_all();
        self.by_container.clear();
    }
}

pub struct DockerLogSource {
    docker: Docker,
    config: SourceConfig,
}

impl DockerLogSource {
    pub fn new(docker: Docker, config: SourceConfig) -> Self {
        Self { docker, config }
    }

    /// Reads container output into `tx` until `cancel` fires or the Docker
    /// event stream ends.
    pub async fn run(
        self,
        tx: Sender<LogMessage>,
        mut cancel: Receiver<()>,
    ) -> Result<(), SourceError> {
        let mut followers = Followers::new();

        // Subscribe before listing so no start is missed in between.
        let mut events = Box::pin(self.docker.events(Some(EventsOptionsBuilder::new().build())));

        let running = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::new().all(false).build()))
            .await?;
        for container in running.iter().filter_map(docker::container_from_summary) {
            if !followers.is_following(&container.id) {
                self.attach(&mut followers, container, StartAt::Now, &tx);
            }
        }
        info!("Following {} running containers", followers.len());

        loop {
            tokio::select! {
                _ = cancel.recv() => {
                    info!("Log source cancelled");
                    break;
                }
                Some(()) = followers.join_next() => {}
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(container) = docker::started_container(&event) {
                            // A restart replaces whatever follower is left
                            // from the previous run.
                            let since = docker::event_time(&event)
                                .unwrap_or_else(|| Utc::now().timestamp());
                            self.attach(&mut followers, container, StartAt::Since(since), &tx);
                        }
                    }
                    Some(Err(e)) => {
                        followers.abort_all();
                        return Err(e.into());
                    }
                    None => {
                        warn!("Docker event stream ended");
                        break;
                    }
                }
            }
        }

        followers.abort_all();
        Ok(())
    }

    fn attach(
        &self,
        followers: &mut Followers,
        container: Container,
        start: StartAt,
        tx: &Sender<LogMessage>,
    ) {
        if self.config.excludes(&container) {
            debug!("Skipping excluded container {}", container.name);
            return;
        }
        let id = container.id.clone();
        let task = follow(self.docker.clone(), container, logs_options(start), tx.clone());
        followers.start(id, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Arc<Container> {
        Arc::new(Container::new("abc", "/rancher-metadata", "rancher/metadata:v0.9"))
    }

    #[test]
    fn test_message_from_output_strips_newline() {
        let output = LogOutput::StdOut {
            message: "ready\r\n".into(),
        };
        let message = message_from_output(&container(), output).unwrap();
        assert_eq!(message.data, "ready");
        assert_eq!(message.source, OutputStream::Stdout);
        assert_eq!(message.container.name, "/rancher-metadata");
    }

    #[test]
    fn test_message_from_output_streams() {
        let output = LogOutput::StdErr {
            message: "failed\n".into(),
        };
        let message = message_from_output(&container(), output).unwrap();
        assert_eq!(message.source, OutputStream::Stderr);

        let stdin = LogOutput::StdIn {
            message: "typed\n".into(),
        };
        assert!(message_from_output(&container(), stdin).is_none());

        let empty = LogOutput::StdOut {
            message: "\n".into(),
        };
        assert!(message_from_output(&container(), empty).is_none());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let output = LogOutput::StdOut {
            message: vec![b'o', b'k', 0xff].into(),
        };
        let message = message_from_output(&container(), output).unwrap();
        assert_eq!(message.data, "ok\u{fffd}");
    }

    #[test]
    fn test_config_defaults() {
        let config: SourceConfig = toml::from_str("").unwrap();
        assert_eq!(config, SourceConfig::default());
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn test_exclude_matches_name_or_id_prefix() {
        let config = SourceConfig {
            exclude: vec!["fluentd-rancher".to_string(), "/r-dns".to_string(), "9bd0".to_string()],
            ..Default::default()
        };
        assert!(config.excludes(&Container::new("1111", "/fluentd-rancher", "img")));
        assert!(config.excludes(&Container::new("2222", "/r-dns", "img")));
        assert!(config.excludes(&Container::new("9bd0e1", "/other", "img")));
        assert!(!config.excludes(&Container::new("3333", "/fluentd-rancher-2", "img")));
    }

    #[test]
    fn test_running_containers_start_at_the_end() {
        let options = logs_options(StartAt::Now);
        assert!(options.follow && options.stdout && options.stderr);
        assert_eq!(options.tail, "0");
        assert_eq!(options.since, 0);
    }

    #[test]
    fn test_started_containers_skip_earlier_runs() {
        let options = logs_options(StartAt::Since(1_700_000_000));
        assert_eq!(options.tail, "all");
        assert_eq!(options.since, 1_700_000_000);
        assert!(options.follow);

        let options = logs_options(StartAt::Since(i64::MAX));
        assert_eq!(options.since, i32::MAX);
    }

    #[tokio::test]
    async fn test_restart_replaces_unjoined_follower() {
        let mut followers = Followers::new();
        followers.start("c1".to_string(), std::future::pending());
        // The container restarts before its old follower has been joined.
        followers.start("c1".to_string(), std::future::pending());
        assert_eq!(followers.len(), 1);

        // The aborted follower ends without dropping its successor.
        assert_eq!(followers.join_next().await, Some(()));
        assert!(followers.is_following("c1"));
        assert_eq!(followers.len(), 1);

        followers.abort_all();
        assert!(!followers.is_following("c1"));
    }

    #[tokio::test]
    async fn test_finished_follower_is_forgotten() {
        let mut followers = Followers::new();
        followers.start("c1".to_string(), async {});
        followers.start("c2".to_string(), std::future::pending());

        assert_eq!(followers.join_next().await, Some(()));
        assert!(!followers.is_following("c1"));
        assert!(followers.is_following("c2"));

        // The container can be followed again after its stream ended.
        followers.start("c1".to_string(), std::future::pending());
        assert!(followers.is_following("c1"));
        followers.abort_all();
    }

    #[tokio::test]
    async fn test_panicked_follower_is_forgotten() {
        let mut followers = Followers::new();
        followers.start("c1".to_string(), async { panic!("stream decoder failed") });

        assert_eq!(followers.join_next().await, Some(()));
        assert!(!followers.is_following("c1"));
        assert_eq!(followers.join_next().await, None);
    }
}
