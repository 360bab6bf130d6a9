use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::{future::Future, time::Duration};

use crate::error::{Error, NetworkError, Result};
use crate::request::Request;

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Performs a single request and returns the full response body.
///
/// The fetch pipeline only talks to the network through this trait, which
/// lets tests substitute instrumented fakes for the HTTP client.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Vec<u8>, NetworkError>> + Send;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a client sending our user agent. A zero `timeout` disables the
    /// client-side timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if timeout > ZERO_DURATION {
            builder = builder.timeout(timeout);
        }

        let mut headers = HeaderMap::new();
        headers.append(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "osm-grid-downloader_rs_",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = builder
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed creating HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, NetworkError> {
        let response = self
            .client
            .request(request.method.clone(), request.url())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}

fn classify(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if let Some(status) = err.status() {
        NetworkError::Status(status.as_u16())
    } else {
        NetworkError::Connection(err.to_string())
    }
}
