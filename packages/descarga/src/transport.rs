//! HTTP transport with retry for SOAP calls.
//!
//! The exchange itself sits behind [`HttpTransport`]; [`SoapTransport`]
//! adds the retry policy on top so it can be exercised without a network.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::config::{
    ServiceEndpoints, TransportConfig, AUTH_ACTION, DOWNLOAD_ACTION, REQUEST_ACTION,
    VERIFY_ACTION,
};
use crate::error::{DescargaError, Result};
use crate::soap::fault_from_bytes;

/// User agent string identifying this client.
const USER_AGENT: &str = concat!("sat-descarga/", env!("CARGO_PKG_VERSION"));

const CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const ACCEPT: &str = "text/xml, application/soap+xml, application/xml";

/// The four service operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Authenticate,
    CreateRequest,
    VerifyRequest,
    DownloadPackage,
}

impl Operation {
    pub fn soap_action(&self) -> &'static str {
        match self {
            Self::Authenticate => AUTH_ACTION,
            Self::CreateRequest => REQUEST_ACTION,
            Self::VerifyRequest => VERIFY_ACTION,
            Self::DownloadPackage => DOWNLOAD_ACTION,
        }
    }

    pub fn url<'a>(&self, endpoints: &'a ServiceEndpoints) -> &'a str {
        match self {
            Self::Authenticate => &endpoints.authenticate,
            Self::CreateRequest => &endpoints.create_request,
            Self::VerifyRequest => &endpoints.verify_request,
            Self::DownloadPackage => &endpoints.download,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::CreateRequest => "create_request",
            Self::VerifyRequest => "verify_request",
            Self::DownloadPackage => "download_package",
        }
    }
}

/// One SOAP POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub soap_action: &'static str,
    pub body: String,

    /// Session token, sent as `Authorization: WRAP access_token="..."`.
    pub token: Option<String>,
}

impl HttpRequest {
    /// Value of the `Authorization` header, if the request carries a token.
    pub fn authorization(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|token| format!(r#"WRAP access_token="{token}""#))
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// An exchange that produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub message: String,

    /// Connect, timeout and body I/O failures are worth another attempt.
    pub retryable: bool,
}

/// Sends one request, without retrying.
pub trait HttpTransport: Send + Sync {
    fn post(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure>;
}

/// Production transport over a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a client with the configured timeout and no redirects.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .build()
            .map_err(|e| DescargaError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn failure(e: reqwest::Error) -> TransportFailure {
    TransportFailure {
        retryable: e.is_connect() || e.is_timeout() || e.is_request() || e.is_body(),
        message: e.to_string(),
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("SOAPAction", request.soap_action)
            .body(request.body.clone());
        if let Some(authorization) = request.authorization() {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }

        let response = builder.send().map_err(failure)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(failure)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Retrying SOAP caller.
#[derive(Debug, Clone)]
pub struct SoapTransport<T> {
    inner: T,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<T: HttpTransport> SoapTransport<T> {
    pub fn new(inner: T, config: &TransportConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// POST `body` for `operation`, retrying transient failures.
    ///
    /// Returns the body of the first 2xx response. 5xx responses and
    /// retryable transport failures are retried after `retry_delay`; other
    /// statuses fail at once.
    ///
    /// # Errors
    /// `Transport` carrying the attempt count and the last cause. When a
    /// failing response is a SOAP fault, the fault text is the cause.
    pub fn call(
        &self,
        operation: Operation,
        endpoints: &ServiceEndpoints,
        body: String,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let request = HttpRequest {
            url: operation.url(endpoints).to_string(),
            soap_action: operation.soap_action(),
            body,
            token: token.map(str::to_string),
        };

        let mut last_cause = String::from("no attempt made");

        for attempt in 1..=self.max_attempts {
            if attempt > 1 && !self.retry_delay.is_zero() {
                tracing::debug!(
                    operation = operation.name(),
                    attempt,
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "Retrying after delay"
                );
                thread::sleep(self.retry_delay);
            }

            match self.inner.post(&request) {
                Ok(response) if response.is_success() => {
                    tracing::debug!(
                        operation = operation.name(),
                        attempt,
                        status = response.status,
                        bytes = response.body.len(),
                        "SOAP call succeeded"
                    );
                    return Ok(response.body);
                }
                Ok(response) => {
                    let cause = response_cause(&response);
                    if !response.is_server_error() {
                        tracing::warn!(
                            operation = operation.name(),
                            status = response.status,
                            attempt,
                            "Client error, not retrying"
                        );
                        return Err(DescargaError::Transport {
                            attempts: attempt,
                            last_cause: cause,
                        });
                    }
                    tracing::warn!(
                        operation = operation.name(),
                        status = response.status,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Server error, will retry"
                    );
                    last_cause = cause;
                }
                Err(failure) if failure.retryable => {
                    tracing::warn!(
                        operation = operation.name(),
                        error = %failure.message,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Connection error, will retry"
                    );
                    last_cause = failure.message;
                }
                Err(failure) => {
                    return Err(DescargaError::Transport {
                        attempts: attempt,
                        last_cause: failure.message,
                    });
                }
            }
        }

        Err(DescargaError::Transport {
            attempts: self.max_attempts,
            last_cause,
        })
    }
}

fn response_cause(response: &HttpResponse) -> String {
    match fault_from_bytes(&response.body) {
        Some(fault) => format!("HTTP {}: {fault}", response.status),
        None if response.is_server_error() => format!("Server error: {}", response.status),
        None => format!("HTTP {}", response.status),
    }
}
