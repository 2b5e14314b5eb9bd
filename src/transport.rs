//! Byte-stream transports the adapter can dial.
//!
//! A transport is looked up by name once, when the adapter is built, and
//! yields the single [`Connection`] the adapter writes to for its whole
//! lifetime.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

pub const DEFAULT_TRANSPORT: &str = "tcp";

/// An open, ordered connection to a collector.
#[async_trait]
pub trait Connection: Send {
    /// Writes the whole buffer as one operation.
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(
        &self,
        address: &str,
        options: &HashMap<String, String>,
    ) -> io::Result<Box<dyn Connection>>;
}

fn bool_option(options: &HashMap<String, String>, key: &str) -> io::Result<Option<bool>> {
    options
        .get(key)
        .map(|val| {
            val.parse::<bool>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Option '{key}' must be true or false, got '{val}'"),
                )
            })
        })
        .transpose()
}

pub struct TcpTransport;

struct TcpConnection {
    stream: TcpStream,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(
        &self,
        address: &str,
        options: &HashMap<String, String>,
    ) -> io::Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(address).await?;
        if let Some(nodelay) = bool_option(options, "tcp_nodelay")? {
            stream.set_nodelay(nodelay)?;
        }
        log::debug!("Connected to {} over tcp", stream.peer_addr()?);
        Ok(Box::new(TcpConnection { stream }))
    }
}

/// Sends every record as its own datagram.
pub struct UdpTransport;

struct UdpConnection {
    socket: UdpSocket,
}

#[async_trait]
impl Connection for UdpConnection {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(buf).await?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("Datagram truncated: sent {sent} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn dial(
        &self,
        address: &str,
        _options: &HashMap<String, String>,
    ) -> io::Result<Box<dyn Connection>> {
        let remote = tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No addresses found for {address}"),
            )
        })?;
        let local = if remote.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        log::debug!("Connected to {remote} over udp");
        Ok(Box::new(UdpConnection { socket }))
    }
}

/// Transports available to adapters, by name.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    inner: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register("tcp", TcpTransport);
        registry.register("udp", UdpTransport);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, transport: impl Transport + 'static) {
        self.inner.insert(name.into(), Arc::new(transport));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.inner.get(name).cloned()
    }
}
