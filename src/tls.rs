use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// Build a rustls client configuration
///
/// With `net/ca_bundle_path` set, trust is rooted exclusively in the PEM
/// certificates of that bundle; otherwise the compiled-in webpki roots are
/// used. Failures surface as network errors with stable reasons so callers
/// can tell a missing bundle from an unparsable one.
pub fn client_config(ca_bundle_path: Option<&str>) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    match ca_bundle_path {
        Some(path) => {
            let file = File::open(path).map_err(|_| Error::network("missing_ca_bundle"))?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<std::io::Result<Vec<_>>>()
                .map_err(|_| Error::network("invalid_ca_bundle"))?;
            let (added, _) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(Error::network("invalid_ca_bundle"));
            }
            tracing::debug!(path, added, "loaded ca bundle");
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Negotiate TLS over an established stream
///
/// `host` is the name to verify against; bracketed IPv6 literals are
/// unwrapped before conversion.
pub async fn handshake<S>(config: Arc<ClientConfig>, host: &str, stream: S) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::network("ssl_invalid_hostname"))?;
    let connector = TlsConnector::from(config);
    connector
        .connect(server_name, stream)
        .await
        .map_err(|_| Error::network("ssl_handshake_error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_roots_build() {
        assert!(client_config(None).is_ok());
    }

    #[test]
    fn test_missing_bundle_path() {
        let err = client_config(Some("/nonexistent/cacert.pem")).unwrap_err();
        assert_eq!(err, Error::network("missing_ca_bundle"));
    }

    #[test]
    fn test_bundle_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a pem bundle").unwrap();
        let err = client_config(Some(file.path().to_str().unwrap())).unwrap_err();
        assert_eq!(err, Error::network("invalid_ca_bundle"));
    }
}
