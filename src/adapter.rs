//! Adapter registration.
//!
//! Adapters are registered by name. Building a route looks the adapter up
//! and runs its factory, which dials the route's transport once.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc::Receiver;

use crate::message::LogMessage;
use crate::route::Route;
use crate::tags::TagTable;
use crate::transport::TransportRegistry;

pub const ADAPTER_NAME: &str = "fluentd-rancher";

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Unable to find adapter: {0}")]
    AdapterNotFound(String),
    #[error("Unable to find transport '{transport}' for adapter {adapter}")]
    TransportNotFound { adapter: String, transport: String },
    #[error("Unable to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Consumes a stream of log messages until the stream is closed.
#[async_trait]
pub trait LogAdapter: Send {
    async fn stream(&mut self, logstream: Receiver<LogMessage>);
}

/// What factories get besides the route.
#[derive(Clone, Default)]
pub struct AdapterContext {
    pub transports: TransportRegistry,
    pub tags: TagTable,
}

pub type AdapterFactory = for<'a> fn(
    &'a Route,
    &'a AdapterContext,
) -> BoxFuture<'a, Result<Box<dyn LogAdapter>, AdapterError>>;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    inner: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(ADAPTER_NAME, crate::forwarder::factory);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: AdapterFactory) {
        self.inner.insert(name.into(), factory);
    }

    pub fn lookup(&self, name: &str) -> Option<AdapterFactory> {
        self.inner.get(name).copied()
    }

    /// Creates the adapter named by the route.
    pub async fn build(
        &self,
        route: &Route,
        context: &AdapterContext,
    ) -> Result<Box<dyn LogAdapter>, AdapterError> {
        let factory = self
            .lookup(&route.adapter)
            .ok_or_else(|| AdapterError::AdapterNotFound(route.adapter.clone()))?;
        factory(route, context).await
    }
}
