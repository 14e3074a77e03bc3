use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::proxy;
use crate::settings::{Config, Settings};
use crate::tls;
use crate::url::Url;

/// An event observed on a transport
///
/// Events for a single transport are delivered in the order the underlying
/// I/O occurred: data always precedes the EOF or error that follows it.
/// End of stream is reported as `Error(Error::Eof)`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A chunk of received bytes, arbitrarily sized
    Data(Vec<u8>),
    /// A transport-level failure, or `Error::Eof` at end of stream
    Error(Error),
}

/// A connected byte transport
///
/// A transport is exclusively owned by the in-flight request: it is written
/// to and closed by at most one logical flow at a time. Sequential reuse
/// across non-overlapping send/receive cycles is the only sanctioned
/// sharing pattern.
///
/// The `emit_*` hooks inject synthetic events; they are no-ops on real
/// network transports and exist so that a caller-driven [`DumbTransport`]
/// can be used behind the same trait object.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Write bytes to the peer
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next event from the peer
    async fn recv(&mut self) -> TransportEvent;

    /// Close the transport
    async fn close(&mut self);

    /// Inject a synthetic data event (caller-driven transports only)
    fn emit_data(&mut self, _data: Vec<u8>) {}

    /// Inject a synthetic error event (caller-driven transports only)
    fn emit_error(&mut self, _error: Error) {}
}

/// Transport over any async byte stream (TCP, TLS-over-TCP, ...)
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S> {
    /// Wrap a connected stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await.map_err(Error::from)
    }

    async fn recv(&mut self) -> TransportEvent {
        let mut chunk = vec![0u8; 8 * 1024];
        match self.stream.read(&mut chunk).await {
            Ok(0) => TransportEvent::Error(Error::Eof),
            Ok(n) => {
                chunk.truncate(n);
                TransportEvent::Data(chunk)
            }
            Err(err) => TransportEvent::Error(err.into()),
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// A synthetic transport driven entirely by the caller
///
/// Selected with the `net/dumb_transport` setting: connection establishment
/// succeeds immediately and the test feeds events through `emit_data` /
/// `emit_error` (directly or via a cloned [`DumbHandle`]). Sent bytes are
/// captured for inspection instead of hitting the network.
pub struct DumbTransport {
    sender: mpsc::UnboundedSender<TransportEvent>,
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Vec<u8>,
}

impl std::fmt::Debug for DumbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumbTransport")
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl DumbTransport {
    /// Create a transport with an empty event queue
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            sent: Vec::new(),
        }
    }

    /// Get a handle that can emit events from outside the owning flow
    pub fn handle(&self) -> DumbHandle {
        DumbHandle {
            sender: self.sender.clone(),
        }
    }

    /// Bytes written to this transport so far
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }
}

impl Default for DumbTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for DumbTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sent.extend_from_slice(data);
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        self.receiver
            .recv()
            .await
            .unwrap_or(TransportEvent::Error(Error::Eof))
    }

    async fn close(&mut self) {
        self.receiver.close();
    }

    fn emit_data(&mut self, data: Vec<u8>) {
        let _ = self.sender.send(TransportEvent::Data(data));
    }

    fn emit_error(&mut self, error: Error) {
        let _ = self.sender.send(TransportEvent::Error(error));
    }
}

/// Emitter side of a [`DumbTransport`], usable from another task
#[derive(Clone)]
pub struct DumbHandle {
    sender: mpsc::UnboundedSender<TransportEvent>,
}

impl DumbHandle {
    /// Queue a synthetic data event
    pub fn emit_data(&self, data: impl Into<Vec<u8>>) {
        let _ = self.sender.send(TransportEvent::Data(data.into()));
    }

    /// Queue a synthetic error event
    pub fn emit_error(&self, error: Error) {
        let _ = self.sender.send(TransportEvent::Error(error));
    }
}

/// Transport factory handed to the request orchestrator
///
/// The orchestrator never reaches for a global: whoever drives a request
/// passes the connector down, and tests substitute scripted
/// implementations.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a transport to the target described by `config` and `url`
    async fn connect(&self, config: &Config, url: &Url) -> Result<Box<dyn Transport>>;
}

/// The production connector: direct TCP, SOCKS5, Tor-bridged, TLS
#[derive(Debug, Default, Clone, Copy)]
pub struct NetConnector;

#[async_trait]
impl Connector for NetConnector {
    async fn connect(&self, config: &Config, url: &Url) -> Result<Box<dyn Transport>> {
        connect(config, url).await
    }
}

/// Establish a transport according to the configured proxy policy
///
/// Decision order: `net/dumb_transport` short-circuits to a caller-driven
/// transport; otherwise the SOCKS policy of [`proxy::socks_proxy_for`]
/// picks the TCP endpoint, the SOCKS5 tunnel is negotiated when a proxy is
/// in play, and `https` targets get TLS on top.
pub async fn connect(config: &Config, url: &Url) -> Result<Box<dyn Transport>> {
    if config.dumb_transport {
        tracing::debug!("net/dumb_transport set, handing out a synthetic transport");
        return Ok(Box::new(DumbTransport::new()));
    }
    let socks = proxy::socks_proxy_for(config, url)?;
    let endpoint = match &socks {
        Some(socks) => format!("{}:{}", socks.host, socks.port),
        None => format!("{}:{}", url.address, url.port),
    };
    tracing::debug!(%endpoint, proxied = socks.is_some(), "establishing connection");
    let mut stream = TcpStream::connect(&endpoint).await.map_err(Error::from)?;
    if socks.is_some() {
        proxy::socks5_connect(&mut stream, &url.address, url.port).await?;
    }
    if url.schema == "https" {
        let tls_config = tls::client_config(config.ca_bundle_path.as_deref())?;
        let stream = tls::handshake(tls_config, &url.address, stream).await?;
        return Ok(Box::new(StreamTransport::new(stream)));
    }
    Ok(Box::new(StreamTransport::new(stream)))
}

/// Establish a transport straight from a settings snapshot
///
/// Validates the snapshot and parses the target URL before connecting, so a
/// snapshot without `http/url` fails with [`Error::MissingUrl`] and a
/// malformed one with [`Error::UrlParser`].
pub async fn connect_from_settings(settings: &Settings) -> Result<Box<dyn Transport>> {
    let config = Config::from_settings(settings)?;
    let raw_url = config.url.clone().ok_or(Error::MissingUrl)?;
    let url = Url::parse(&raw_url)?;
    connect(&config, &url).await
}
