//! Per-request dispatch between the active tape and the live upstream

use std::future::Future;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::hosts::HostFilter;
use crate::message::{Request, Response};
use crate::tape::TapeHandle;
use crate::{Result, TapedeckError};

/// Sends requests to the real server
pub trait Upstream: Send + Sync {
    /// Perform `request` live
    fn forward(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// How a request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Host is ignored or no tape is inserted; forwarded untouched
    Bypassed,
    /// Served from a recorded interaction
    Replayed,
    /// Forwarded live and appended to the tape
    Recorded,
}

/// A response plus how it was obtained
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Response to hand back to the client
    pub response: Response,
    /// Where the response came from
    pub outcome: Outcome,
}

/// Applies the active tape's mode to each intercepted request
pub struct Interceptor<U> {
    upstream: U,
    hosts: HostFilter,
}

impl<U: Upstream> Interceptor<U> {
    /// Create an interceptor forwarding misses to `upstream`
    pub fn new(upstream: U, hosts: HostFilter) -> Self {
        Self { upstream, hosts }
    }

    /// The live upstream
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Serve one request
    ///
    /// A miss is re-checked under the tape lock once the live response is in,
    /// so identical requests racing on one tape are recorded once.
    ///
    /// # Errors
    ///
    /// Returns `NoMatchFound` for a read-only miss, or the upstream's error
    pub async fn handle(&self, tape: Option<&TapeHandle>, request: Request) -> Result<Dispatched> {
        let ignored = request
            .host()
            .is_some_and(|host| self.hosts.is_ignored(&host));

        let Some(tape) = tape.filter(|_| !ignored) else {
            debug!("Bypassing tape for {} {}", request.method, request.uri);
            let response = self.upstream.forward(&request).await?;
            return Ok(Dispatched {
                response,
                outcome: Outcome::Bypassed,
            });
        };

        {
            let guard = tape.lock().await;
            if let Some(interaction) = guard.seek(&request)? {
                return Ok(Dispatched {
                    response: interaction.response().clone(),
                    outcome: Outcome::Replayed,
                });
            }
        }

        let response = self.upstream.forward(&request).await?;

        // Another task may have recorded the same request while we were live
        let mut guard = tape.lock().await;
        if guard.is_readable() {
            if let Some((position, existing)) = guard.find(&request) {
                debug!(
                    "Tape '{}' #{} recorded concurrently, replaying it for {} {}",
                    guard.name(),
                    position,
                    request.method,
                    request.uri
                );
                return Ok(Dispatched {
                    response: existing.response().clone(),
                    outcome: Outcome::Replayed,
                });
            }
        }
        guard.record(request, response.clone())?;

        Ok(Dispatched {
            response,
            outcome: Outcome::Recorded,
        })
    }
}

/// Plain-HTTP live forwarder
pub struct HttpUpstream {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpUpstream {
    /// Create a new HTTP upstream
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }
}

impl Default for HttpUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl Upstream for HttpUpstream {
    async fn forward(&self, request: &Request) -> Result<Response> {
        let http_request = to_http_request(request)?;

        debug!("Forwarding {} to {}", request.method, request.uri);

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            TapedeckError::Upstream(format!("{} {}: {e}", request.method, request.uri))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TapedeckError::Upstream(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Build the hyper request for a recorded request
fn to_http_request(request: &Request) -> Result<hyper::Request<Full<Bytes>>> {
    let method = request.method.parse::<Method>().map_err(|e| {
        TapedeckError::Upstream(format!("Invalid HTTP method '{}': {e}", request.method))
    })?;

    let uri = request
        .uri
        .parse::<Uri>()
        .map_err(|e| TapedeckError::Upstream(format!("Invalid URI '{}': {e}", request.uri)))?;

    let mut builder = hyper::Request::builder().method(method).uri(uri);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(request.body.clone()))
        .map_err(|e| TapedeckError::Upstream(format!("Failed to build request: {e}")))
}
