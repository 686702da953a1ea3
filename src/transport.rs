use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENTS: [&str; 4] = [
    // Desktop Firefox
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    // Desktop Chrome
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    // Android Chrome
    "Mozilla/5.0 (Linux; Android 14; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36",
    // iOS Safari
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("request to {url} failed with HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("expected a {expected} body from {url}")]
    UnexpectedBody { url: String, expected: &'static str },
}

/// Shape of the value a successful request yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Json,
    Text,
    Response,
}

impl BodyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BodyMode::Json => "json",
            BodyMode::Text => "text",
            BodyMode::Response => "response",
        }
    }
}

/// Status and headers of a response whose body was not read.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Text(String),
    Response(ResponseMeta),
}

impl Body {
    pub fn into_json(self, url: &str) -> Result<Value, TransportError> {
        match self {
            Body::Json(value) => Ok(value),
            _ => Err(TransportError::UnexpectedBody {
                url: url.to_string(),
                expected: "json",
            }),
        }
    }

    pub fn into_text(self, url: &str) -> Result<String, TransportError> {
        match self {
            Body::Text(text) => Ok(text),
            _ => Err(TransportError::UnexpectedBody {
                url: url.to_string(),
                expected: "text",
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub mode: BodyMode,
    pub timeout: Duration,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            mode: BodyMode::Text,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::HEAD,
            mode: BodyMode::Response,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn mode(mut self, mode: BodyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub trait Transport {
    async fn request(&self, request: Request) -> Result<Body, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn attempt(&self, request: &Request, user_agent: &str) -> Result<Body, TransportError> {
        let network = |source: reqwest::Error| TransportError::Network {
            url: request.url.clone(),
            source,
        };

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(USER_AGENT, user_agent);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder.send().await.map_err(network)?;
            let status = response.status();
            debug!(
                status = status.as_u16(),
                kind = request.mode.as_str(),
                ua = user_agent_prefix(user_agent),
                "HTTP {}",
                request.url
            );
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: request.url.clone(),
                    status,
                });
            }
            match request.mode {
                BodyMode::Json => Ok(Body::Json(response.json().await.map_err(network)?)),
                BodyMode::Text => Ok(Body::Text(response.text().await.map_err(network)?)),
                BodyMode::Response => Ok(Body::Response(ResponseMeta {
                    status,
                    headers: response.headers().clone(),
                })),
            }
        };

        // Dropping the exchange future on timeout aborts the connection.
        tokio::time::timeout(request.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                url: request.url.clone(),
                after: request.timeout,
            })?
    }
}

impl Transport for HttpTransport {
    async fn request(&self, request: Request) -> Result<Body, TransportError> {
        with_user_agent_rotation(|ua| self.attempt(&request, ua)).await
    }
}

/// Runs `attempt` once per pool entry until one succeeds.
pub async fn with_user_agent_rotation<T, F, Fut>(mut attempt: F) -> Result<T, TransportError>
where
    F: FnMut(&'static str) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    const LAST: usize = USER_AGENTS.len() - 1;
    for ua in USER_AGENTS.into_iter().take(LAST) {
        match attempt(ua).await {
            Ok(value) => return Ok(value),
            Err(err) => warn!(ua = user_agent_prefix(ua), "HTTP attempt failed: {err}"),
        }
    }
    let ua = USER_AGENTS[LAST];
    attempt(ua)
        .await
        .inspect_err(|err| warn!(ua = user_agent_prefix(ua), "HTTP attempt failed: {err}"))
}

pub fn user_agent_prefix(ua: &str) -> &str {
    match ua.find(')') {
        Some(idx) => &ua[..=idx],
        None => ua,
    }
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    const NO_CONTENT_500: &str =
        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const OK_BODY: &str = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";
    const OK_EMPTY: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    fn local_transport() -> HttpTransport {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpTransport::with_client(client)
    }

    async fn read_request_head(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn header_line(head: &str, key: &str) -> Option<String> {
        head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case(key)
                .then(|| value.trim().to_string())
        })
    }

    /// Answers one connection per scripted reply and returns each request head.
    async fn serve(replies: Vec<&'static str>) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut heads = Vec::new();
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                heads.push(read_request_head(&mut stream).await);
                stream.write_all(reply.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
            heads
        });
        (addr, handle)
    }

    fn status_error(status: StatusCode) -> TransportError {
        TransportError::Status {
            url: String::from("https://example.test"),
            status,
        }
    }

    #[tokio::test]
    async fn rotation_stops_at_first_success() {
        let seen = RefCell::new(Vec::new());
        let result = with_user_agent_rotation(|ua| {
            seen.borrow_mut().push(ua);
            let attempt = seen.borrow().len();
            async move {
                if attempt < 3 {
                    Err(status_error(StatusCode::FORBIDDEN))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(seen.borrow().as_slice(), &USER_AGENTS[..3]);
    }

    #[tokio::test]
    async fn rotation_returns_last_error_when_pool_exhausted() {
        let attempts = RefCell::new(0usize);
        let result: Result<(), _> = with_user_agent_rotation(|_| {
            *attempts.borrow_mut() += 1;
            let attempt = *attempts.borrow();
            async move {
                if attempt == USER_AGENTS.len() {
                    Err(status_error(StatusCode::BAD_GATEWAY))
                } else {
                    Err(status_error(StatusCode::FORBIDDEN))
                }
            }
        })
        .await;

        assert_eq!(*attempts.borrow(), 4);
        match result {
            Err(TransportError::Status { status, .. }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn user_agent_prefix_cuts_after_platform() {
        assert_eq!(
            user_agent_prefix(USER_AGENTS[2]),
            "Mozilla/5.0 (Linux; Android 14; Pixel 7)"
        );
        assert_eq!(user_agent_prefix("curl/8.0"), "curl/8.0");
    }

    #[test]
    fn head_request_reads_no_body() {
        let request = Request::head("https://example.test/a.mp4").timeout(Duration::from_secs(5));
        assert_eq!(request.method, Method::HEAD);
        assert_eq!(request.mode, BodyMode::Response);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn body_accessors_reject_wrong_mode() {
        let body = Body::Text(String::from("{}"));
        assert!(body.clone().into_json("u").is_err());
        assert_eq!(body.into_text("u").unwrap(), "{}");
    }

    #[tokio::test]
    async fn silent_server_times_out_on_every_user_agent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        let timeout = Duration::from_millis(200);
        let started = tokio::time::Instant::now();
        let err = local_transport()
            .request(Request::get(format!("http://{addr}/hang")).timeout(timeout))
            .await
            .unwrap_err();
        server.abort();

        assert!(matches!(err, TransportError::Timeout { after, .. } if after == timeout));
        assert_eq!(accepted.load(Ordering::SeqCst), USER_AGENTS.len());
        assert!(started.elapsed() >= timeout * 4);
    }

    #[tokio::test]
    async fn server_errors_rotate_until_last_user_agent_succeeds() {
        let (addr, server) =
            serve(vec![NO_CONTENT_500, NO_CONTENT_500, NO_CONTENT_500, OK_BODY]).await;

        let body = local_transport()
            .request(
                Request::get(format!("http://{addr}/clock.json"))
                    .header("Referer", "https://allmanga.to")
                    .timeout(Duration::from_secs(5)),
            )
            .await
            .unwrap();
        assert_eq!(body.into_text("clock").unwrap(), "ok");

        let heads = server.await.unwrap();
        let agents: Vec<String> = heads
            .iter()
            .map(|head| header_line(head, "user-agent").unwrap())
            .collect();
        assert_eq!(agents, USER_AGENTS.map(String::from).to_vec());
        assert!(
            heads
                .iter()
                .all(|head| header_line(head, "referer").as_deref() == Some("https://allmanga.to"))
        );
    }

    #[tokio::test]
    async fn head_request_returns_status_without_body() {
        let (addr, server) = serve(vec![OK_EMPTY]).await;

        let body = local_transport()
            .request(Request::head(format!("http://{addr}/video.mp4")))
            .await
            .unwrap();

        match body {
            Body::Response(meta) => assert_eq!(meta.status, StatusCode::OK),
            other => panic!("unexpected body: {other:?}"),
        }
        let heads = server.await.unwrap();
        assert!(heads[0].starts_with("HEAD /video.mp4 "));
    }
}
