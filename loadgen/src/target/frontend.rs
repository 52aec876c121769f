//! The storefront frontend over HTTP/1.
//!
//! [`HttpTarget`] is cheap to clone; every virtual user holds a clone and all
//! of them share the underlying connection pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri, header::CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use metrics::{counter, histogram};
use tracing::debug;

use super::{Error, Transport};
use crate::encode;

/// The HTTP target.
///
/// Requests are resolved against a fixed base URL. Every request is bounded
/// by the configured timeout, which covers connecting, sending and reading
/// the full response body.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client<HttpConnector, Full<Bytes>>,
    base: String,
    timeout: Duration,
    labels: Vec<(String, String)>,
}

impl HttpTarget {
    /// Create a new [`HttpTarget`] rooted at `base`.
    #[must_use]
    pub fn new(base: &Uri, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new())
            .retry_canceled_requests(false)
            .build(connector);

        let labels = vec![
            ("component".to_string(), "target".to_string()),
            ("component_name".to_string(), "frontend".to_string()),
        ];

        Self {
            client,
            base: base.to_string().trim_end_matches('/').to_string(),
            timeout,
            labels,
        }
    }

    /// The base every request path is appended to, without trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<StatusCode, Error> {
        let uri = format!("{base}{path}", base = self.base);
        let parsed: Uri = uri.parse().map_err(|source| Error::InvalidUri {
            uri: uri.clone(),
            source,
        })?;

        let builder = Request::builder().method(method.clone()).uri(parsed);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, encode::CONTENT_TYPE)
                .body(Full::new(Bytes::from(body)))?,
            None => builder.body(Full::new(Bytes::new()))?,
        };

        let mut labels = self.labels.clone();
        labels.push(("method".to_string(), method.to_string()));
        labels.push(("path".to_string(), route(path).to_string()));

        counter!("requests_sent", &labels).increment(1);
        let start = Instant::now();
        let exchange = async {
            let response =
                self.client
                    .request(request)
                    .await
                    .map_err(|source| Error::RequestFailed {
                        uri: uri.clone(),
                        source: Box::new(source),
                    })?;
            let status = response.status();
            // Drain the body so the connection returns to the pool.
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|source| Error::Body {
                    uri: uri.clone(),
                    source: Box::new(source),
                })?;
            Ok::<_, Error>((status, body.to_bytes().len()))
        };
        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::Timeout {
                uri: uri.clone(),
                timeout: self.timeout,
            }),
        };
        histogram!("request_latency_seconds", &labels).record(start.elapsed().as_secs_f64());

        match result {
            Ok((status, response_bytes)) => {
                counter!("response_bytes", &labels).increment(response_bytes as u64);
                let mut status_labels = labels;
                status_labels.push(("status_code".to_string(), status.as_u16().to_string()));
                counter!("request_ok", &status_labels).increment(1);
                if !status.is_success() {
                    debug!("{method} {uri} answered {status}");
                }
                Ok(status)
            }
            Err(err) => {
                let mut error_labels = labels;
                error_labels.push(("error".to_string(), err.to_string()));
                counter!("request_failure", &error_labels).increment(1);
                Err(err)
            }
        }
    }
}

/// The route template of `path`, bounding the cardinality of the `path`
/// label. Product pages collapse to `/product/{id}`.
fn route(path: &str) -> &str {
    match path.strip_prefix("/product/") {
        Some(id) if !id.is_empty() => "/product/{id}",
        _ => path,
    }
}

#[async_trait]
impl Transport for HttpTarget {
    async fn get(&self, path: &str) -> Result<StatusCode, Error> {
        self.send(Method::GET, path, None).await
    }

    async fn post_form(&self, path: &str, body: String) -> Result<StatusCode, Error> {
        self.send(Method::POST, path, Some(body)).await
    }
}
