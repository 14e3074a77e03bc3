use crate::error::Result;
use crate::headers::Headers;
use crate::settings::Config;
use crate::transport::Transport;
use crate::url::Url;

/// An HTTP request for a single hop
///
/// One request is created per connection attempt; every redirect hop builds
/// a fresh request owning its own copies of headers and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Request method, e.g. `GET`
    pub method: String,
    /// Parsed target URL
    pub url: Url,
    /// Wire version string, e.g. `HTTP/1.1`
    pub http_version: String,
    /// Caller-supplied headers, serialized in insertion order
    pub headers: Headers,
    /// Raw body bytes
    pub body: Vec<u8>,
    /// Verbatim path+query override from `http/path`
    path: Option<String>,
}

impl Request {
    /// Build a request from the validated configuration
    pub fn build(config: &Config, url: &Url, headers: &Headers, body: &[u8]) -> Self {
        Self {
            method: config.method.clone(),
            url: url.clone(),
            http_version: config.http_version.clone(),
            headers: headers.clone(),
            body: body.to_vec(),
            path: config.path.clone(),
        }
    }

    /// The path+query written on the request line
    ///
    /// The `http/path` override is used verbatim when present; otherwise the
    /// URL's path and query, never its fragment.
    pub fn request_target(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => self.url.path_and_query(),
        }
    }

    /// Serialize to wire bytes
    ///
    /// Layout: request line, caller headers in insertion order, an injected
    /// `Host` (with the port only when it is not the schema default), a
    /// `Content-Length` when the body is non-empty, a blank line, the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.method,
                self.request_target(),
                self.http_version
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            wire.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        let host = if self.url.has_default_port() {
            self.url.address.clone()
        } else {
            format!("{}:{}", self.url.address, self.url.port)
        };
        wire.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
        if !self.body.is_empty() {
            wire.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(&self.body);
        wire
    }
}

/// Serialize and write a request on an established transport
pub async fn send_request<T>(transport: &mut T, request: &Request) -> Result<()>
where
    T: Transport + ?Sized,
{
    let wire = request.serialize();
    tracing::trace!(
        method = %request.method,
        target = %request.request_target(),
        bytes = wire.len(),
        "sending request"
    );
    transport.send(&wire).await
}
