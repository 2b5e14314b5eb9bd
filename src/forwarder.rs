//! The fluentd-rancher adapter.
//!
//! Records from Rancher infrastructure containers are tagged with their
//! subsystem and written to a fluentd collector, one JSON array per record.
//! Everything else is dropped. Delivery is best effort: a failed record is
//! logged and skipped, and the connection is never reopened.

use std::io;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use log::{debug, error, info, trace};
use tokio::sync::mpsc::Receiver;

use crate::adapter::{ADAPTER_NAME, AdapterContext, AdapterError, LogAdapter};
use crate::classifier::Classifier;
use crate::message::LogMessage;
use crate::route::Route;
use crate::transport::{Connection, DEFAULT_TRANSPORT};
use crate::wire::{EncodeError, ForwardRecord, RecordFields, unix_timestamp};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("Write error: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// The image belongs to no known subsystem.
    Filtered,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub delivered: u64,
    pub filtered: u64,
    pub failed: u64,
}

pub struct FluentdRancherAdapter {
    conn: Box<dyn Connection>,
    classifier: Classifier,
    route: Route,
    stats: ForwardStats,
}

impl FluentdRancherAdapter {
    /// Dials the route's transport. Fails if the transport is unknown or the
    /// connection cannot be opened.
    pub async fn connect(route: &Route, context: &AdapterContext) -> Result<Self, AdapterError> {
        let transport_name = route.adapter_transport(DEFAULT_TRANSPORT);
        let transport = context.transports.lookup(transport_name).ok_or_else(|| {
            AdapterError::TransportNotFound {
                adapter: route.adapter.clone(),
                transport: transport_name.to_string(),
            }
        })?;

        let conn = transport
            .dial(&route.address, &route.options)
            .await
            .map_err(|source| AdapterError::Dial {
                address: route.address.clone(),
                source,
            })?;

        info!("{ADAPTER_NAME}: connected to {route}");
        Ok(Self::with_connection(
            conn,
            Classifier::new(context.tags.clone()),
            route.clone(),
        ))
    }

    pub fn with_connection(conn: Box<dyn Connection>, classifier: Classifier, route: Route) -> Self {
        Self {
            conn,
            classifier,
            route,
            stats: ForwardStats::default(),
        }
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Handles exactly one message.
    pub async fn forward(&mut self, message: &LogMessage) -> Result<Outcome, ForwardError> {
        let timestamp = unix_timestamp(chrono::Utc::now());

        let Some(tag) = self.classifier.classify(&message.container.image) else {
            let stream: &str = message.source.as_ref();
            trace!(
                "Skipping {stream} line from {} ({}) received at {}",
                message.container.name,
                message.container.image,
                message.time
            );
            return Ok(Outcome::Filtered);
        };

        let record = ForwardRecord::new(tag, timestamp, RecordFields::from(message));
        let payload = record.encode()?;
        self.conn.write(&payload).await?;

        Ok(Outcome::Delivered)
    }
}

#[async_trait]
impl LogAdapter for FluentdRancherAdapter {
    async fn stream(&mut self, mut logstream: Receiver<LogMessage>) {
        debug!("{ADAPTER_NAME}: streaming to {}", self.route);

        while let Some(message) = logstream.recv().await {
            match self.forward(&message).await {
                Ok(Outcome::Delivered) => self.stats.delivered += 1,
                Ok(Outcome::Filtered) => self.stats.filtered += 1,
                Err(err) => {
                    self.stats.failed += 1;
                    error!("{ADAPTER_NAME}: {err}");
                }
            }
        }

        let stats = self.stats();
        info!(
            "{ADAPTER_NAME}: log stream closed ({} delivered, {} filtered, {} failed)",
            stats.delivered, stats.filtered, stats.failed
        );
    }
}

pub fn factory<'a>(
    route: &'a Route,
    context: &'a AdapterContext,
) -> BoxFuture<'a, Result<Box<dyn LogAdapter>, AdapterError>> {
    Box::pin(async move {
        let adapter = FluentdRancherAdapter::connect(route, context).await?;
        Ok(Box::new(adapter) as Box<dyn LogAdapter>)
    })
}
