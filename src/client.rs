use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client as ReqwestClient;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, FailureReason, Result};
use crate::util::{retriable_status, truncate_body, urljoin};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_MAX: usize = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint is joined onto.
    pub url: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total attempts per call, including the first.
    pub retry_max: usize,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verify: true,
            timeout: DEFAULT_TIMEOUT,
            retry_max: DEFAULT_RETRY_MAX,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// One HTTP exchange as seen by a [`Transport`].
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("query", &self.query)
            .field("body", &self.body)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// A failure below HTTP: no status line was received.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends a single request, once. Retrying is the caller's business.
pub trait Transport {
    fn execute(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportError>;
}

/// Blocking `reqwest` transport holding one pooled connection.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: ReqwestClient,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> std::result::Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("elsync/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("elsync")),
        );
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = ReqwestClient::builder()
            .default_headers(default_headers)
            .timeout(config.timeout);

        if !config.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| TransportError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let mut req = self.http.request(request.method.clone(), &request.url);
        if let Some(token) = &request.bearer {
            req = req.bearer_auth(token);
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        // A body cut short is a transport failure, retried like one.
        let body = resp
            .text()
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;
        Ok(ApiResponse { status, body })
    }
}

/// JSON API client that owns the connection and the active bearer token.
///
/// Every call is retried on 429/503 (and on connection failures) with a fixed
/// delay, up to `retry_max` attempts. Any other non-200 status fails at once.
pub struct HttpClient<T = ReqwestTransport> {
    url: String,
    retry_max: usize,
    retry_delay: Duration,
    bearer: Option<String>,
    sleeper: Box<dyn Fn(Duration)>,
    transport: T,
}

impl HttpClient<ReqwestTransport> {
    pub fn new(config: &ClientConfig) -> std::result::Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> HttpClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        Self {
            url: config.url.clone(),
            retry_max: config.retry_max.max(1),
            retry_delay: config.retry_delay,
            bearer: None,
            sleeper: Box::new(thread::sleep),
            transport,
        }
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Installs the bearer token sent with every following call.
    pub fn set_bearer(&mut self, token: impl Into<String>) {
        self.bearer = Some(token.into());
    }

    pub fn clear_bearer(&mut self) {
        self.bearer = None;
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// GET without a body, POST with one. Returns the parsed JSON body.
    pub fn call(&self, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        match body {
            Some(body) => self.api_json(Method::POST, endpoint, &[], Some(body.clone())),
            None => self.api_json(Method::GET, endpoint, &[], None),
        }
    }

    pub fn get<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        self.api_json(Method::GET, endpoint, &[], None)
    }

    pub fn get_with_query<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> Result<R> {
        self.api_json(Method::GET, endpoint, query, None)
    }

    pub fn post<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let body = serde_json::to_value(body).map_err(|source| Error::Decode {
            url: urljoin(&self.url, endpoint),
            source,
        })?;
        self.api_json(Method::POST, endpoint, &[], Some(body))
    }

    fn api_json<R: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<R> {
        let request = ApiRequest {
            method,
            url: urljoin(&self.url, endpoint),
            bearer: self.bearer.clone(),
            query: query.to_vec(),
            body,
        };

        let resp = self.robust_request(&request)?;
        serde_json::from_str::<R>(&resp.body).map_err(|source| Error::Decode {
            url: request.url.clone(),
            source,
        })
    }

    fn robust_request(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;

            match self.transport.execute(request) {
                Ok(resp) if resp.status == 200 => return Ok(resp),
                Ok(resp) if retriable_status(resp.status) => {
                    if attempt >= self.retry_max {
                        return Err(Error::RequestFailed {
                            url: request.url.clone(),
                            reason: FailureReason::RetriesExhausted,
                            status: Some(resp.status),
                            body: resp.body,
                        });
                    }
                    debug!(
                        url = %request.url,
                        status = resp.status,
                        attempt,
                        "provider busy, retrying"
                    );
                }
                Ok(resp) => {
                    return Err(Error::RequestFailed {
                        url: request.url.clone(),
                        reason: FailureReason::UnexpectedStatus,
                        status: Some(resp.status),
                        body: resp.body,
                    });
                }
                Err(err) => {
                    if attempt >= self.retry_max {
                        return Err(Error::RequestFailed {
                            url: request.url.clone(),
                            reason: FailureReason::Transport,
                            status: None,
                            body: err.to_string(),
                        });
                    }
                    warn!(
                        url = %request.url,
                        attempt,
                        error = %truncate_body(&err.0, 200),
                        "could not connect, retrying"
                    );
                }
            }

            (self.sleeper)(self.retry_delay);
        }
    }
}

impl<T> fmt::Debug for HttpClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("url", &self.url)
            .field("retry_max", &self.retry_max)
            .field("retry_delay", &self.retry_delay)
            .field("authorized", &self.bearer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Scripted {
        replies: RefCell<VecDeque<std::result::Result<ApiResponse, TransportError>>>,
        seen: RefCell<Vec<ApiRequest>>,
    }

    impl Scripted {
        fn new(statuses: &[u16]) -> Self {
            let replies = statuses
                .iter()
                .map(|&status| {
                    Ok(ApiResponse {
                        status,
                        body: if status == 200 {
                            "{\"ok\":true}".to_string()
                        } else {
                            format!("status {status}")
                        },
                    })
                })
                .collect();
            Self {
                replies: RefCell::new(replies),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Scripted {
        fn execute(
            &self,
            request: &ApiRequest,
        ) -> std::result::Result<ApiResponse, TransportError> {
            self.seen.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("script exhausted".into())))
        }
    }

    fn client(transport: Scripted, sleeps: Rc<Cell<usize>>) -> HttpClient<Scripted> {
        let config = ClientConfig::new("https://api.test/api/");
        HttpClient::with_transport(&config, transport)
            .with_sleeper(move |_| sleeps.set(sleeps.get() + 1))
    }

    /// Serves one response whose body stops short of its declared length.
    fn truncated_body_server() -> String {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"ok\"")
                .unwrap();
        });
        format!("http://{addr}/")
    }

    #[test]
    fn short_body_is_a_transport_error() {
        let config = ClientConfig::new(truncated_body_server());
        let transport = ReqwestTransport::new(&config).unwrap();
        let request = ApiRequest {
            method: Method::GET,
            url: config.url.clone(),
            bearer: None,
            query: Vec::new(),
            body: None,
        };
        let err = transport.execute(&request).unwrap_err();
        assert!(err.0.contains("response body"), "{err}");
    }

    #[test]
    fn transport_errors_are_retried() {
        let sleeps = Rc::new(Cell::new(0));
        let transport = Scripted::new(&[200]);
        transport
            .replies
            .borrow_mut()
            .push_front(Err(TransportError("failed to read response body".into())));
        let client = client(transport, sleeps.clone());

        assert!(client.call("isalive", None).is_ok());
        assert_eq!(client.transport().seen.borrow().len(), 2);
        assert_eq!(sleeps.get(), 1);
    }

    #[test]
    fn gives_up_after_retry_max_transient_replies() {
        let sleeps = Rc::new(Cell::new(0));
        let client = client(Scripted::new(&[503; 12]), sleeps.clone());

        let err = client.call("isalive", None).unwrap_err();
        match err {
            Error::RequestFailed {
                reason, status, ref body, ..
            } => {
                assert_eq!(reason, FailureReason::RetriesExhausted);
                assert_eq!(status, Some(503));
                assert_eq!(body, "status 503");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(client.transport().seen.borrow().len(), DEFAULT_RETRY_MAX);
        assert_eq!(sleeps.get(), DEFAULT_RETRY_MAX - 1);
    }

    #[test]
    fn success_after_transient_stops_sleeping() {
        let sleeps = Rc::new(Cell::new(0));
        let client = client(Scripted::new(&[429, 503, 200, 200]), sleeps.clone());

        let value = client.call("isalive", None).unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
        assert_eq!(client.transport().seen.borrow().len(), 3);
        assert_eq!(sleeps.get(), 2);
    }

    #[test]
    fn unexpected_status_is_not_retried() {
        let sleeps = Rc::new(Cell::new(0));
        let client = client(Scripted::new(&[500, 200]), sleeps.clone());

        let err = client.call("token", None).unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(matches!(
            err,
            Error::RequestFailed {
                reason: FailureReason::UnexpectedStatus,
                ..
            }
        ));
        assert_eq!(client.transport().seen.borrow().len(), 1);
        assert_eq!(sleeps.get(), 0);
    }

    #[test]
    fn transport_errors_are_retried_then_reported() {
        let sleeps = Rc::new(Cell::new(0));
        let client = client(Scripted::new(&[]), sleeps.clone()).with_retry_max(3);

        let err = client.call("isalive", None).unwrap_err();
        assert!(matches!(
            err,
            Error::RequestFailed {
                reason: FailureReason::Transport,
                status: None,
                ..
            }
        ));
        assert_eq!(client.transport().seen.borrow().len(), 3);
        assert_eq!(sleeps.get(), 2);
    }

    #[test]
    fn bearer_and_body_reach_the_transport() {
        let sleeps = Rc::new(Cell::new(0));
        let mut client = client(Scripted::new(&[200]), sleeps);
        client.set_bearer("abc");

        let body = serde_json::json!({"meteringPoints": {"meteringPoint": ["1"]}});
        client.call("meteringpoints/meteringpoint/getcharges", Some(&body)).unwrap();

        let seen = client.transport().seen.borrow();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(
            seen[0].url,
            "https://api.test/api/meteringpoints/meteringpoint/getcharges"
        );
        assert_eq!(seen[0].bearer.as_deref(), Some("abc"));
        assert_eq!(seen[0].body.as_ref(), Some(&body));
    }

    #[test]
    fn malformed_success_body_is_a_decode_error() {
        let transport = Scripted {
            replies: RefCell::new(VecDeque::from([Ok(ApiResponse {
                status: 200,
                body: "not json".to_string(),
            })])),
            seen: RefCell::new(Vec::new()),
        };
        let client = client(transport, Rc::new(Cell::new(0)));
        assert!(matches!(
            client.call("isalive", None),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let mut client = client(Scripted::new(&[]), Rc::new(Cell::new(0)));
        client.set_bearer("secret-token");
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
