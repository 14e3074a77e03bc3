use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// A typed settings value
///
/// Values are stored as written by the caller and coerced on access, so
/// `{"net/timeout", "3.0"}` and `{"net/timeout", 3.0}` behave the same.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl Value {
    /// Coerce to a string
    pub fn as_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }

    /// Coerce to an integer, if representable
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Coerce to a float, if representable
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Bool(_) => None,
        }
    }

    /// Coerce to a boolean, if representable
    ///
    /// Accepts the string spellings `yes`/`no`, `true`/`false`, and `1`/`0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "1" => Some(true),
                "no" | "false" | "0" | "" => Some(false),
                _ => None,
            },
            Value::Float(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An immutable per-request configuration snapshot
///
/// Settings map dotted keys (`"http/url"`, `"net/socks5_proxy"`, ...) to
/// typed values. A snapshot is built once, shared read-only with every
/// request stage, and never mutated mid-request.
///
/// # Examples
///
/// ```rust
/// use probex::Settings;
///
/// let settings = Settings::new()
///     .set("http/url", "http://www.example.com/")
///     .set("http/max_redirects", 4)
///     .set("net/timeout", 3.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: BTreeMap<String, Value>,
}

impl Settings {
    /// Create an empty settings snapshot
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Set a key, returning the snapshot for chained construction
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Insert a key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Recognized settings keys
///
/// | key | effect |
/// |---|---|
/// | `http/url` | target URL (required) |
/// | `http/method` | request method, default GET |
/// | `http/http_version` | wire version string, default `HTTP/1.1` |
/// | `http/path` | overrides path+query derived from the URL |
/// | `http/max_redirects` | redirect-hop bound, default 0 |
/// | `http/ignore_body` | skip body accumulation when set |
/// | `net/ca_bundle_path` | CA bundle for TLS verification |
/// | `net/socks5_proxy` | explicit `host:port` SOCKS5 proxy |
/// | `net/tor_socks_port` | local Tor SOCKS port for onion targets |
/// | `net/timeout` | seconds before the in-flight stage times out |
/// | `net/dumb_transport` | test seam: synthetic, caller-driven transport |
const RECOGNIZED_KEYS: &[&str] = &[
    "http/url",
    "http/method",
    "http/http_version",
    "http/path",
    "http/max_redirects",
    "http/ignore_body",
    "net/ca_bundle_path",
    "net/socks5_proxy",
    "net/tor_socks_port",
    "net/timeout",
    "net/dumb_transport",
];

/// Validated, strongly-typed view of a [`Settings`] snapshot
///
/// Built once per request. Every recognized key is enumerated here; unknown
/// keys are ignored, matching the historical behavior of the settings bag,
/// and a recognized key whose value cannot be converted fails validation
/// with [`Error::InvalidSetting`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw target URL, absent when the caller never supplied one
    pub url: Option<String>,
    /// Request method
    pub method: String,
    /// Wire version string
    pub http_version: String,
    /// Verbatim path+query override
    pub path: Option<String>,
    /// Redirect-hop bound
    pub max_redirects: u32,
    /// Skip body accumulation
    pub ignore_body: bool,
    /// CA bundle for TLS verification
    pub ca_bundle_path: Option<String>,
    /// Explicit `host:port` SOCKS5 proxy
    pub socks5_proxy: Option<String>,
    /// Local Tor SOCKS port for onion targets
    pub tor_socks_port: Option<u16>,
    /// Per-stage timeout
    pub timeout: Option<Duration>,
    /// Use a synthetic caller-driven transport
    pub dumb_transport: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            method: "GET".to_string(),
            http_version: "HTTP/1.1".to_string(),
            path: None,
            max_redirects: 0,
            ignore_body: false,
            ca_bundle_path: None,
            socks5_proxy: None,
            tor_socks_port: None,
            timeout: None,
            dumb_transport: false,
        }
    }
}

impl Config {
    /// Validate a settings snapshot into a typed configuration
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut config = Config::default();
        for (key, value) in settings.iter() {
            match key {
                "http/url" => config.url = Some(value.as_str()),
                "http/method" => config.method = value.as_str(),
                "http/http_version" => config.http_version = value.as_str(),
                "http/path" => config.path = Some(value.as_str()),
                "http/max_redirects" => {
                    let n = value
                        .as_int()
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| Error::invalid_setting(key))?;
                    config.max_redirects = u32::try_from(n)
                        .map_err(|_| Error::invalid_setting(key))?;
                }
                "http/ignore_body" => {
                    config.ignore_body =
                        value.as_bool().ok_or_else(|| Error::invalid_setting(key))?;
                }
                "net/ca_bundle_path" => config.ca_bundle_path = Some(value.as_str()),
                "net/socks5_proxy" => config.socks5_proxy = Some(value.as_str()),
                "net/tor_socks_port" => {
                    let port = value
                        .as_int()
                        .and_then(|n| u16::try_from(n).ok())
                        .ok_or_else(|| Error::invalid_setting(key))?;
                    config.tor_socks_port = Some(port);
                }
                "net/timeout" => {
                    let seconds = value
                        .as_float()
                        .filter(|s| *s >= 0.0 && s.is_finite())
                        .ok_or_else(|| Error::invalid_setting(key))?;
                    config.timeout = Some(Duration::from_secs_f64(seconds));
                }
                "net/dumb_transport" => {
                    config.dumb_transport =
                        value.as_bool().ok_or_else(|| Error::invalid_setting(key))?;
                }
                other => {
                    tracing::debug!(key = other, "ignoring unrecognized setting");
                }
            }
        }
        Ok(config)
    }

    /// Check whether a key belongs to the recognized set
    pub fn is_recognized_key(key: &str) -> bool {
        RECOGNIZED_KEYS.contains(&key)
    }
}
