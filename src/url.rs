use std::fmt;

use url::Host;
use url::Url as RawUrl;

use crate::error::{Error, Result};

/// A parsed URL, decomposed into the components the engine works with
///
/// Parsing delegates the heavy lifting to the `url` crate; this type keeps
/// the flat component view the request stages need. A `Url` is immutable
/// once parsed: redirect resolution builds a new value rather than mutating
/// the base.
///
/// # Examples
///
/// ```rust
/// use probex::Url;
///
/// let url = Url::parse("https://www.example.com:8443/path?q=1").unwrap();
/// assert_eq!(url.schema, "https");
/// assert_eq!(url.address, "www.example.com");
/// assert_eq!(url.port, 8443);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    /// URL scheme, e.g. `http`, `https`, `httpo`
    pub schema: String,
    /// Host, keeping the bracket form for IPv6 literals
    pub address: String,
    /// Port, defaulted from the schema when not explicit
    pub port: u16,
    /// Path component, empty or starting with `/`
    pub path: String,
    /// Query string without the leading `?`
    pub query: String,
    /// Fragment without the leading `#`
    pub fragment: String,
}

/// Default port for a schema: 443 for `https`, 80 otherwise
pub fn default_port(schema: &str) -> u16 {
    if schema == "https" {
        443
    } else {
        80
    }
}

impl Url {
    /// Parse a raw URL string
    ///
    /// Structurally invalid input, including an empty host, yields
    /// [`Error::UrlParser`].
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = RawUrl::parse(raw)?;
        let schema = parsed.scheme().to_string();
        let address = match parsed.host() {
            Some(Host::Ipv6(addr)) => format!("[{addr}]"),
            Some(host) => host.to_string(),
            None => return Err(Error::UrlParser),
        };
        if address.is_empty() {
            return Err(Error::UrlParser);
        }
        let port = parsed.port().unwrap_or_else(|| default_port(&schema));
        Ok(Self {
            schema,
            address,
            port,
            path: parsed.path().to_string(),
            query: parsed.query().unwrap_or("").to_string(),
            fragment: parsed.fragment().unwrap_or("").to_string(),
        })
    }

    /// Check whether this URL names an onion target
    ///
    /// Onion targets are identified by the `httpo` schema or a `.onion`
    /// address suffix; they are only reachable through a Tor SOCKS proxy.
    pub fn is_onion(&self) -> bool {
        self.schema == "httpo" || self.address.ends_with(".onion")
    }

    /// Path plus query as sent on the request line, never the fragment
    pub fn path_and_query(&self) -> String {
        let path = if self.path.is_empty() {
            "/"
        } else {
            self.path.as_str()
        };
        if self.query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.query)
        }
    }

    /// Check whether the port is the default for the schema
    pub fn has_default_port(&self) -> bool {
        self.port == default_port(&self.schema)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.schema, self.address)?;
        if !self.has_default_port() {
            write!(f, ":{}", self.port)?;
        }
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

/// Split a `Location` value into path and query, discarding any fragment
fn split_path_query(location: &str) -> (&str, &str) {
    let location = location.split('#').next().unwrap_or(location);
    match location.split_once('?') {
        Some((path, query)) => (path, query),
        None => (location, ""),
    }
}

/// Resolve a `Location` header value against the URL that produced it
///
/// Handles the four redirect forms: schema-relative (`//host/path`),
/// absolute-path (`/path`), absolute URL, and relative path. A relative
/// redirect never inherits the base query string.
///
/// # Examples
///
/// ```rust
/// use probex::{redirect, Url};
///
/// let base = Url::parse("http://www.x.org/f?x").unwrap();
/// let next = redirect(&base, "/bar").unwrap();
/// assert_eq!(next.to_string(), "http://www.x.org/bar");
/// ```
pub fn redirect(base: &Url, location: &str) -> Result<Url> {
    if let Some(rest) = location.strip_prefix("//") {
        return Url::parse(&format!("{}://{}", base.schema, rest));
    }
    if location.starts_with('/') {
        let (path, query) = split_path_query(location);
        return Ok(Url {
            schema: base.schema.clone(),
            address: base.address.clone(),
            port: base.port,
            path: path.to_string(),
            query: query.to_string(),
            fragment: String::new(),
        });
    }
    if let Ok(absolute) = Url::parse(location) {
        return Ok(absolute);
    }
    // Relative form: append to the base path, always dropping the base query.
    let (segment, query) = split_path_query(location);
    let mut path = base.path.clone();
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(segment);
    Ok(Url {
        schema: base.schema.clone(),
        address: base.address.clone(),
        port: base.port,
        path,
        query: query.to_string(),
        fragment: String::new(),
    })
}
