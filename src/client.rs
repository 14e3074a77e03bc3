use std::sync::Arc;

use crate::cancel::CancelHandle;
use crate::error::{Error, Failure};
use crate::headers::Headers;
use crate::request::{send_request, Request};
use crate::response::{recv_response, Response};
use crate::settings::{Config, Settings};
use crate::timeout::try_with_timeout;
use crate::transport::{Connector, NetConnector, Transport};
use crate::url::{redirect, Url};

type RequestResult = std::result::Result<Response, Failure>;

/// The request orchestrator
///
/// Drives `Connect → Send → Receive` for every hop of a redirect-following
/// interaction. The transport factory is an explicit handle: production
/// callers use the default [`NetConnector`], tests substitute scripted
/// connectors.
///
/// # Examples
///
/// ```rust,no_run
/// use probex::{Client, Headers, Settings};
///
/// #[tokio::main]
/// async fn main() {
///     let settings = Settings::new()
///         .set("http/url", "http://www.example.com/humans.txt")
///         .set("http/max_redirects", 4);
///     let client = Client::new();
///     match client.request(&settings, &Headers::new(), b"").await {
///         Ok(response) => println!("{}", response.status_code),
///         Err(failure) => eprintln!("{}", failure.error),
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    connector: Arc<dyn Connector>,
}

impl Client {
    /// Create a client using the production connector
    pub fn new() -> Self {
        Self::with_connector(Arc::new(NetConnector))
    }

    /// Create a client around an explicit transport factory
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Perform a request, following redirects up to `http/max_redirects`
    ///
    /// Each hop builds a fresh [`Request`] preserving the original method
    /// and headers, and every completed intermediate response is linked into
    /// the final response's chain. A stage failure surfaces immediately as
    /// [`Failure`]; the partial chain collected so far is discarded with it.
    pub async fn request(
        &self,
        settings: &Settings,
        headers: &Headers,
        body: impl AsRef<[u8]>,
    ) -> RequestResult {
        let mut config = Config::from_settings(settings).map_err(Failure::from)?;
        let raw_url = config
            .url
            .clone()
            .ok_or_else(|| Failure::from(Error::MissingUrl))?;
        let mut url = Url::parse(&raw_url).map_err(Failure::from)?;
        let body = body.as_ref();
        let mut history: Vec<Response> = Vec::new();
        loop {
            let request = Request::build(&config, &url, headers, body);
            let mut transport =
                try_with_timeout(config.timeout, self.connector.connect(&config, &url))
                    .await
                    .map_err(Failure::from)?;
            try_with_timeout(config.timeout, send_request(transport.as_mut(), &request))
                .await
                .map_err(Failure::from)?;
            let mut response = recv_response(transport.as_mut(), &config).await?;
            transport.close().await;
            response.request = request;

            let hops = history.len() as u32;
            if response.is_redirect() && hops < config.max_redirects {
                if let Some(location) = response.headers.get("Location") {
                    let next = redirect(&response.request.url, location).map_err(Failure::from)?;
                    tracing::debug!(
                        hop = hops + 1,
                        status = response.status_code,
                        location,
                        next = %next,
                        "following redirect"
                    );
                    url = next;
                    history.push(response);
                    // The explicit path override binds to the first hop only.
                    config.path = None;
                    continue;
                }
            }
            response.set_history(history);
            return Ok(response);
        }
    }

    /// Like [`request`](Client::request), racing an idempotent cancel signal
    ///
    /// Resolves with [`Error::Canceled`] when the handle fires first; the
    /// in-flight hop is dropped at its next suspension point.
    pub async fn request_cancellable(
        &self,
        settings: &Settings,
        headers: &Headers,
        body: impl AsRef<[u8]>,
        cancel: &CancelHandle,
    ) -> RequestResult {
        tokio::select! {
            biased;
            _ = cancel.canceled() => Err(Failure::from(Error::Canceled)),
            result = self.request(settings, headers, body) => result,
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Perform a request with a default client
pub async fn request(
    settings: &Settings,
    headers: &Headers,
    body: impl AsRef<[u8]>,
) -> RequestResult {
    Client::new().request(settings, headers, body).await
}

/// One send/receive cycle on an existing transport
///
/// Supports sequential pipelining: the caller may drive several
/// non-overlapping cycles on the same transport. Redirects are not
/// followed at this level.
pub async fn sendrecv<T>(
    transport: &mut T,
    settings: &Settings,
    headers: &Headers,
    body: impl AsRef<[u8]>,
) -> RequestResult
where
    T: Transport + ?Sized,
{
    let config = Config::from_settings(settings).map_err(Failure::from)?;
    let raw_url = config
        .url
        .clone()
        .ok_or_else(|| Failure::from(Error::MissingUrl))?;
    let url = Url::parse(&raw_url).map_err(Failure::from)?;
    let request = Request::build(&config, &url, headers, body.as_ref());
    try_with_timeout(config.timeout, send_request(transport, &request))
        .await
        .map_err(Failure::from)?;
    let mut response = recv_response(transport, &config).await?;
    response.request = request;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DumbTransport, TransportEvent};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    struct ScriptedTransport {
        events: VecDeque<TransportEvent>,
        sent: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, data: &[u8]) -> crate::error::Result<()> {
            self.sent.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn recv(&mut self) -> TransportEvent {
            match self.events.pop_front() {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    /// Connector handing out one scripted transport per hop
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
        sent: Mutex<Vec<Arc<Mutex<Vec<u8>>>>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Vec<TransportEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_on_hop(&self, hop: usize) -> String {
            let logs = self.sent.lock().unwrap();
            let bytes = logs[hop].lock().unwrap();
            String::from_utf8_lossy(&bytes).into_owned()
        }

        fn hops(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            _config: &Config,
            _url: &Url,
        ) -> crate::error::Result<Box<dyn Transport>> {
            let events = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("no script for this hop");
            let sent = Arc::new(Mutex::new(Vec::new()));
            self.sent.lock().unwrap().push(sent.clone());
            Ok(Box::new(ScriptedTransport {
                events: events.into(),
                sent,
            }))
        }
    }

    fn response_script(wire: &str) -> Vec<TransportEvent> {
        vec![
            TransportEvent::Data(wire.as_bytes().to_vec()),
            TransportEvent::Error(Error::Eof),
        ]
    }

    fn redirect_script(status: u16, location: &str) -> Vec<TransportEvent> {
        response_script(&format!(
            "HTTP/1.1 {status} Redirect\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n"
        ))
    }

    fn ok_script(body: &str) -> Vec<TransportEvent> {
        response_script(&format!(
            "HTTP/1.1 200 Ok\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ))
    }

    fn scripted_client(scripts: Vec<Vec<TransportEvent>>) -> (Client, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::new(scripts));
        (Client::with_connector(connector.clone()), connector)
    }

    #[tokio::test]
    async fn test_missing_url() {
        let failure = Client::new()
            .request(&Settings::new(), &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::MissingUrl);

        // A method alone is not enough either.
        let settings = Settings::new().set("http/method", "GET");
        let failure = Client::new()
            .request(&settings, &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::MissingUrl);
    }

    #[tokio::test]
    async fn test_malformed_url() {
        let settings = Settings::new().set("http/url", ">*7\n\n");
        let failure = Client::new()
            .request(&settings, &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::UrlParser);
    }

    #[tokio::test]
    async fn test_single_response_roundtrip() {
        let (client, connector) = scripted_client(vec![ok_script("antani")]);
        let settings = Settings::new().set("http/url", "http://www.example.com/humans.txt");
        let response = client
            .request(&settings, &Headers::new().with("Accept", "*/*"), b"")
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.text(), "antani");
        assert!(response.previous().is_none());
        assert_eq!(response.request.method, "GET");
        assert_eq!(response.request.url.address, "www.example.com");
        assert!(connector.sent_on_hop(0).starts_with("GET /humans.txt HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_redirect_chain_depth_and_linkage() {
        let (client, connector) = scripted_client(vec![
            redirect_script(301, "http://www.example.com/first"),
            redirect_script(302, "/second"),
            redirect_script(302, "third"),
            ok_script("done"),
        ]);
        let settings = Settings::new()
            .set("http/url", "http://example.com/")
            .set("http/max_redirects", 4);
        let headers = Headers::new().with("Spam", "Ham").with("Accept", "*/*");
        let response = client.request(&settings, &headers, b"").await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.request.url.path, "/second/third");

        let hop3 = response.previous().unwrap();
        assert_eq!(hop3.status_code, 302);
        assert_eq!(hop3.request.url.path, "/second");
        let hop2 = hop3.previous().unwrap();
        assert_eq!(hop2.status_code, 302);
        assert_eq!(hop2.request.url.address, "www.example.com");
        let hop1 = hop2.previous().unwrap();
        assert_eq!(hop1.status_code, 301);
        assert_eq!(hop1.request.url.address, "example.com");
        assert!(hop1.previous().is_none());

        // Headers are preserved across every hop.
        assert_eq!(connector.hops(), 4);
        for hop in 0..4 {
            let wire = connector.sent_on_hop(hop);
            assert!(wire.contains("Spam: Ham\r\n"), "hop {hop} lost headers");
        }
    }

    #[tokio::test]
    async fn test_redirect_bound_returns_last_3xx() {
        let (client, _) = scripted_client(vec![
            redirect_script(302, "/a"),
            redirect_script(302, "/b"),
            redirect_script(302, "/c"),
        ]);
        let settings = Settings::new()
            .set("http/url", "http://www.example.com/")
            .set("http/max_redirects", 2);
        let response = client.request(&settings, &Headers::new(), b"").await.unwrap();
        assert_eq!(response.status_code, 302);
        assert_eq!(response.history().len(), 2);
    }

    #[tokio::test]
    async fn test_redirects_not_followed_by_default() {
        let (client, connector) = scripted_client(vec![redirect_script(302, "/next")]);
        let settings = Settings::new().set("http/url", "http://www.example.com/");
        let response = client.request(&settings, &Headers::new(), b"").await.unwrap();
        assert_eq!(response.status_code, 302);
        assert_eq!(connector.hops(), 1);
    }

    #[tokio::test]
    async fn test_redirect_without_location_terminates() {
        let (client, _) = scripted_client(vec![response_script(
            "HTTP/1.1 302 Found\r\nContent-Length: 0\r\n\r\n",
        )]);
        let settings = Settings::new()
            .set("http/url", "http://www.example.com/")
            .set("http/max_redirects", 4);
        let response = client.request(&settings, &Headers::new(), b"").await.unwrap();
        assert_eq!(response.status_code, 302);
        assert!(response.previous().is_none());
    }

    #[tokio::test]
    async fn test_failure_discards_partial_chain() {
        let (client, _) = scripted_client(vec![
            redirect_script(302, "/next"),
            vec![
                TransportEvent::Data(b"HTTP/1.1 200 Ok\r\n".to_vec()),
                TransportEvent::Error(Error::network("connection_reset")),
            ],
        ]);
        let settings = Settings::new()
            .set("http/url", "http://www.example.com/")
            .set("http/max_redirects", 4);
        let failure = client
            .request(&settings, &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::network("connection_reset"));
        assert!(failure.response.history().is_empty());
        assert!(failure.response.previous().is_none());
    }

    #[tokio::test]
    async fn test_path_override_first_hop_only() {
        let (client, connector) = scripted_client(vec![
            redirect_script(302, "/landing"),
            ok_script("ok"),
        ]);
        let settings = Settings::new()
            .set("http/url", "http://www.example.com/ignored")
            .set("http/path", "/antani?amicimiei")
            .set("http/max_redirects", 4);
        client
            .request(&settings, &Headers::new(), b"")
            .await
            .unwrap();
        assert!(connector
            .sent_on_hop(0)
            .starts_with("GET /antani?amicimiei HTTP/1.1\r\n"));
        assert!(connector.sent_on_hop(1).starts_with("GET /landing HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_sendrecv_sequential_reuse() {
        let mut transport = DumbTransport::new();
        transport.emit_data(b"HTTP/1.1 200 Ok\r\nContent-Length: 5\r\n\r\nfirst".to_vec());
        transport.emit_data(b"HTTP/1.1 200 Ok\r\nContent-Length: 6\r\n\r\nsecond".to_vec());

        let settings = Settings::new().set("http/url", "http://www.example.com/");
        let first = sendrecv(&mut transport, &settings, &Headers::new(), b"")
            .await
            .unwrap();
        assert_eq!(first.text(), "first");

        let settings = Settings::new().set("http/url", "http://www.example.com/robots.txt");
        let second = sendrecv(&mut transport, &settings, &Headers::new(), b"")
            .await
            .unwrap();
        assert_eq!(second.text(), "second");
        assert_eq!(second.request.url.path, "/robots.txt");
    }

    #[tokio::test]
    async fn test_sendrecv_missing_url() {
        let mut transport = DumbTransport::new();
        let settings = Settings::new().set("http/method", "GET");
        let failure = sendrecv(&mut transport, &settings, &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::MissingUrl);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        // A transport that never produces events trips the stage deadline.
        let (client, _) = scripted_client(vec![vec![]]);
        let settings = Settings::new()
            .set("http/url", "http://www.example.com/")
            .set("net/timeout", 0.05);
        let failure = client
            .request(&settings, &Headers::new(), b"")
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::Timeout);
        assert_eq!(failure.response.response_line, "");
    }

    #[tokio::test]
    async fn test_cancellation_is_idempotent_and_observed() {
        let (client, _) = scripted_client(vec![vec![]]);
        let settings = Settings::new().set("http/url", "http://www.example.com/");
        let cancel = CancelHandle::new();

        let pending = {
            let client = client.clone();
            let settings = settings.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .request_cancellable(&settings, &Headers::new(), b"", &cancel)
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cancel.cancel();
        cancel.cancel();
        cancel.cancel();
        let failure = pending.await.unwrap().unwrap_err();
        assert_eq!(failure.error, Error::Canceled);

        // Cancelling before the call resolves it immediately, once.
        let failure = client
            .request_cancellable(&settings, &Headers::new(), b"", &cancel)
            .await
            .unwrap_err();
        assert_eq!(failure.error, Error::Canceled);
    }

    #[tokio::test]
    async fn test_live_get_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/humans.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello antani"))
            .mount(&server)
            .await;

        let settings = Settings::new().set("http/url", format!("{}/humans.txt", server.uri()));
        let response = request(&settings, &Headers::new().with("Accept", "*/*"), b"")
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.text(), "hello antani");
    }

    #[tokio::test]
    async fn test_live_redirect_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
            .mount(&server)
            .await;

        let settings = Settings::new()
            .set("http/url", format!("{}/old", server.uri()))
            .set("http/max_redirects", 4);
        let response = request(&settings, &Headers::new(), b"").await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.text(), "moved here");
        assert_eq!(response.request.url.path, "/new");
        let previous = response.previous().unwrap();
        assert_eq!(previous.status_code, 302);
        assert_eq!(previous.request.url.path, "/old");
        assert!(previous.previous().is_none());
    }

    #[tokio::test]
    async fn test_live_post_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(body_string("0123456789"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let settings = Settings::new()
            .set("http/url", format!("{}/submit", server.uri()))
            .set("http/method", "POST");
        let response = request(&settings, &Headers::new(), b"0123456789")
            .await
            .unwrap();
        assert_eq!(response.status_code, 201);
    }
}
