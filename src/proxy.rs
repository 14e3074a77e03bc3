use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::settings::Config;
use crate::url::Url;

/// Port of the default local Tor SOCKS endpoint
const DEFAULT_TOR_SOCKS_PORT: u16 = 9050;

/// Endpoint of a SOCKS5 proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksProxy {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
}

impl SocksProxy {
    /// Parse a `host:port` endpoint string
    pub fn parse(endpoint: &str) -> Result<Self> {
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_setting("net/socks5_proxy"))?;
        let port = port
            .parse()
            .map_err(|_| Error::invalid_setting("net/socks5_proxy"))?;
        if host.is_empty() {
            return Err(Error::invalid_setting("net/socks5_proxy"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// A proxy on the loopback interface
    pub fn local(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
        }
    }
}

impl fmt::Display for SocksProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Select the SOCKS5 proxy for a target, if any
///
/// Onion targets always go through a SOCKS proxy: `net/tor_socks_port`
/// when set, else `net/socks5_proxy`, else the default local Tor endpoint
/// `127.0.0.1:9050`. Non-onion targets use `net/socks5_proxy` when set and
/// connect directly otherwise.
pub fn socks_proxy_for(config: &Config, url: &Url) -> Result<Option<SocksProxy>> {
    let selected = if url.is_onion() {
        if let Some(port) = config.tor_socks_port {
            Some(SocksProxy::local(port))
        } else if let Some(endpoint) = &config.socks5_proxy {
            Some(SocksProxy::parse(endpoint)?)
        } else {
            Some(SocksProxy::local(DEFAULT_TOR_SOCKS_PORT))
        }
    } else if let Some(endpoint) = &config.socks5_proxy {
        Some(SocksProxy::parse(endpoint)?)
    } else {
        None
    };
    if let Some(proxy) = &selected {
        tracing::debug!(proxy = %proxy, onion = url.is_onion(), "selected socks5 proxy");
    }
    Ok(selected)
}

/// Negotiate a SOCKS5 CONNECT tunnel to `host:port` on an open stream
///
/// Only the no-authentication method is offered. The target is sent as a
/// domain name unless it is an IP literal; bracketed IPv6 forms are
/// unwrapped before encoding. A non-success reply maps to a network error
/// with a stable reason (e.g. `connection_refused`).
pub async fn socks5_connect<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await?;
    if method != [0x05, 0x00] {
        return Err(Error::network("socks_error"));
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let mut request = vec![0x05, 0x01, 0x00];
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        request.push(0x01);
        request.extend_from_slice(&v4.octets());
    } else if let Ok(v6) = host.parse::<Ipv6Addr>() {
        request.push(0x04);
        request.extend_from_slice(&v6.octets());
    } else {
        if host.len() > 255 {
            return Err(Error::network("socks_error"));
        }
        request.push(0x03);
        request.push(host.len() as u8);
        request.extend_from_slice(host.as_bytes());
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != 0x05 {
        return Err(Error::network("socks_error"));
    }
    if reply[1] != 0x00 {
        return Err(Error::network(socks_reply_reason(reply[1])));
    }
    let bound_len = match reply[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        }
        _ => return Err(Error::network("socks_error")),
    };
    // Drain the bound address and port; their value is irrelevant here.
    let mut bound = vec![0u8; bound_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

fn socks_reply_reason(code: u8) -> &'static str {
    match code {
        0x01 => "socks_general_failure",
        0x02 => "socks_connection_not_allowed",
        0x03 => "network_unreachable",
        0x04 => "host_unreachable",
        0x05 => "connection_refused",
        0x06 => "ttl_expired",
        0x07 => "socks_command_not_supported",
        0x08 => "socks_address_type_not_supported",
        _ => "socks_error",
    }
}
