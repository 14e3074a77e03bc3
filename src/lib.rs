//! probex - asynchronous HTTP request engine for network measurement tools
//!
//! probex is the request engine of a network-measurement toolkit: it
//! establishes a transport (direct, SOCKS5, or Tor-bridged for onion
//! addresses), serializes and sends an HTTP request, incrementally parses
//! the response - including responses whose end is signalled only by
//! connection close - and follows redirect chains while recording the
//! history of intermediate responses.
//!
//! ## Features
//!
//! - **Settings-driven requests**: a single immutable key/value snapshot
//!   configures method, version, redirects, proxying, TLS, and timeouts
//! - **SOCKS5 and Tor support** with onion-target proxy selection
//! - **Hand-rolled incremental response parser** handling Content-Length,
//!   chunked, and close-delimited bodies
//! - **Redirect following** with the full response chain preserved
//! - **Layered error taxonomy** that never hides the partial response
//! - **Caller-driven test transport** behind the same trait as real I/O
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use probex::{Client, Headers, Settings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Settings::new()
//!         .set("http/url", "http://www.example.com/humans.txt")
//!         .set("http/max_redirects", 4)
//!         .set("net/timeout", 10.0);
//!     match Client::new().request(&settings, &Headers::new(), b"").await {
//!         Ok(response) => println!("{} {}", response.status_code, response.text()),
//!         Err(failure) => eprintln!("request failed: {}", failure.error),
//!     }
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod error;
pub mod headers;
pub mod json;
pub mod proxy;
pub mod request;
pub mod response;
pub mod settings;
pub mod timeout;
pub mod tls;
pub mod transport;
pub mod url;

// Re-export main types for convenience
pub use crate::cancel::CancelHandle;
pub use crate::client::{request, sendrecv, Client};
pub use crate::error::{Error, Failure, Result};
pub use crate::headers::Headers;
pub use crate::proxy::SocksProxy;
pub use crate::request::Request;
pub use crate::response::{Previous, Response};
pub use crate::settings::{Config, Settings, Value};
pub use crate::transport::{
    Connector, DumbHandle, DumbTransport, NetConnector, Transport, TransportEvent,
};
pub use crate::url::{redirect, Url};

// Re-export JSON values used across the public API
pub use serde_json::Value as JsonValue;

// Re-export the async runtime for convenience
pub use tokio;
