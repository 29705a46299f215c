//! Transport strategies, tried in order of decreasing sophistication.
//!
//! - [`FullTransport`]: browser-like headers, pooled keep-alive connections,
//!   IPv4-bound sockets, redirects, longest timeout.
//! - [`SimpleTransport`]: minimal headers, no connection reuse, shorter timeout.
//! - [`FallbackTransport`]: a separate HTTP client (`ureq`) on a blocking
//!   thread, shortest timeout.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue,
};
use reqwest::redirect::Policy;

use super::error::TransferError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Response body of a successful fetch.
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub chunks: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for FetchedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedBody")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// One way of downloading a remote artifact.
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a download. Non-2xx answers are errors; the body is streamed.
    async fn fetch(&self, url: &str) -> Result<FetchedBody, TransferError>;
}

pub struct FullTransport {
    http: reqwest::Client,
}

impl FullTransport {
    pub const NAME: &'static str = "full";

    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| TransferError::network(Self::NAME, e))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TransportStrategy for FullTransport {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, TransferError> {
        stream_response(Self::NAME, self.http.get(url)).await
    }
}

pub struct SimpleTransport {
    http: reqwest::Client,
}

impl SimpleTransport {
    pub const NAME: &'static str = "simple";

    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("genflow-transfer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .redirect(Policy::limited(5))
            .build()
            .map_err(|e| TransferError::network(Self::NAME, e))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TransportStrategy for SimpleTransport {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, TransferError> {
        let request = self
            .http
            .get(url)
            .header(ACCEPT, "*/*")
            .header(CONNECTION, "close");
        stream_response(Self::NAME, request).await
    }
}

/// Last resort: `ureq` on the blocking pool.
///
/// Shares no connector, TLS or HTTP/1 code with the reqwest strategies, so
/// servers that trip up hyper still get a chance. The body is buffered since
/// `ureq` only offers a blocking reader.
pub struct FallbackTransport {
    agent: ureq::Agent,
}

impl FallbackTransport {
    pub const NAME: &'static str = "fallback";

    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(5)
            .user_agent(concat!("genflow-fallback/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

#[async_trait]
impl TransportStrategy for FallbackTransport {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch(&self, url: &str) -> Result<FetchedBody, TransferError> {
        let request = self.agent.get(url).set("Accept", "image/*,*/*");

        let (content_type, body) = tokio::task::spawn_blocking(move || {
            let resp = match request.call() {
                Ok(resp) => resp,
                Err(ureq::Error::Status(code, _)) => {
                    return Err(TransferError::Status {
                        strategy: Self::NAME,
                        code,
                    });
                }
                Err(err) => return Err(TransferError::network(Self::NAME, err)),
            };

            let content_type = resp.header("content-type").map(str::to_string);
            let mut body = Vec::new();
            resp.into_reader()
                .read_to_end(&mut body)
                .map_err(|e| TransferError::network(Self::NAME, e))?;
            Ok((content_type, Bytes::from(body)))
        })
        .await
        .map_err(|e| TransferError::network(Self::NAME, format!("blocking task failed: {e}")))??;

        Ok(FetchedBody {
            content_type,
            chunks: stream::once(async move { Ok(body) }).boxed(),
        })
    }
}

/// The default strategy chain.
pub fn default_strategies(
    timeouts: [Duration; 3],
) -> Result<Vec<Box<dyn TransportStrategy>>, TransferError> {
    let [full, simple, fallback] = timeouts;
    Ok(vec![
        Box::new(FullTransport::new(full)?),
        Box::new(SimpleTransport::new(simple)?),
        Box::new(FallbackTransport::new(fallback)),
    ])
}

async fn stream_response(
    strategy: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<FetchedBody, TransferError> {
    let resp = request
        .send()
        .await
        .map_err(|e| TransferError::network(strategy, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(TransferError::Status {
            strategy,
            code: status.as_u16(),
        });
    }

    let content_type = header_string(resp.headers());
    let chunks = resp
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|e| TransferError::network(strategy, e)))
        .boxed();
    Ok(FetchedBody {
        content_type,
        chunks,
    })
}

fn header_string(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
