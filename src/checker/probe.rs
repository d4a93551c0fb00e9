// src/checker/probe.rs
// =============================================================================
// This module checks if ONE URL is alive.
//
// Key functionality:
// - Makes an HTTP HEAD request (lightweight, no body download)
// - Sends an identifying User-Agent header
// - Routes .onion hosts through the SOCKS proxy (see transport.rs)
// - Races the request against a timer; whichever finishes first wins
// - Never fails: every outcome, including errors, becomes a CheckResult
//
// There are no retries here. A link gets another chance on the next sweep,
// and the consecutive failure counter decides when to give up on it.
//
// Rust concepts:
// - async traits: Prober is a trait so the engine can be tested with fakes
// - tokio::time::timeout: dropping the losing future abandons the request
// =============================================================================

use super::transport::{OnionRedirect, Route, Transport};
use crate::store::LinkStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default SOCKS endpoint: a local Tor daemon, resolving names on the proxy side.
pub const DEFAULT_PROXY_ENDPOINT: &str = "socks5h://127.0.0.1:9050";

/// Default probe deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_USER_AGENT: &str = concat!("link-sweeper/", env!("CARGO_PKG_VERSION"));

/// Outcome of a single probe.
///
/// Only ever `Live` or `Dead`; `Unknown` is reserved for links never checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// The URL that was checked
    pub url: String,
    pub status: LinkStatus,
    /// HTTP status code, `None` when no response came back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn live(url: &str, status_code: u16) -> Self {
        Self {
            url: url.to_string(),
            status: LinkStatus::Live,
            status_code: Some(status_code),
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn dead(url: &str, status_code: Option<u16>, message: String) -> Self {
        Self {
            url: url.to_string(),
            status: LinkStatus::Dead,
            status_code,
            error_message: Some(message),
            checked_at: Utc::now(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == LinkStatus::Live
    }
}

/// Anything that can tell whether a URL is alive.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `url`. Must always resolve to a result, never panic or hang
    /// past its own deadline.
    async fn check_link(&self, url: &str) -> CheckResult;
}

/// Knobs for the HTTP prober.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub proxy_endpoint: String,
    pub user_agent: String,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            proxy_endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// The real prober: HEAD requests over a direct or a SOCKS-proxied client.
///
/// Both clients are built once and reused for every probe (connection pooling).
#[derive(Debug, Clone)]
pub struct HttpProber {
    direct: Transport,
    proxied: Transport,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(options: &ProbeOptions) -> Result<Self, reqwest::Error> {
        Ok(Self {
            direct: Transport::direct(options.timeout, &options.user_agent)?,
            proxied: Transport::proxied(
                &options.proxy_endpoint,
                options.timeout,
                &options.user_agent,
            )?,
            timeout: options.timeout,
        })
    }

    fn transport(&self, route: Route) -> &Transport {
        match route {
            Route::Direct => &self.direct,
            Route::Proxied => &self.proxied,
        }
    }

    // Sends the HEAD request and reports which transport the final answer
    // (or failure) came from. A direct redirect onto an onion host is
    // picked up here and re-sent over the proxy.
    async fn send(&self, url: Url) -> (&Transport, reqwest::Result<reqwest::Response>) {
        let transport = self.transport(Route::for_url(&url));
        let outcome = transport.client().head(url).send().await;

        let target = match &outcome {
            Err(e) => OnionRedirect::find(e).map(|redirect| redirect.target.clone()),
            Ok(_) => None,
        };
        match target {
            Some(target) => {
                debug!(target = %target, "Redirected to onion host, continuing over SOCKS");
                let proxied = &self.proxied;
                (proxied, proxied.client().head(target).send().await)
            }
            None => (transport, outcome),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn check_link(&self, url: &str) -> CheckResult {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return CheckResult::dead(url, None, format!("Invalid URL: {}", e)),
        };

        let route = Route::for_url(&parsed);

        // The client has its own timeout too, but this one bounds the whole
        // probe including proxy negotiation and an onion hand-off.
        match tokio::time::timeout(self.timeout, self.send(parsed)).await {
            Ok((_, Ok(response))) => analyze_response(url, response.status()),
            Ok((transport, Err(e))) => {
                CheckResult::dead(url, None, transport.describe_failure(&describe_error(&e)))
            }
            Err(_) => CheckResult::dead(
                url,
                None,
                self.transport(route)
                    .describe_failure(&format!("Request timed out after {:?}", self.timeout)),
            ),
        }
    }
}

// Success-class (2xx) is live, everything else is dead.
// Redirects have already been followed by the client at this point.
fn analyze_response(url: &str, status: reqwest::StatusCode) -> CheckResult {
    if status.is_success() {
        CheckResult::live(url, status.as_u16())
    } else {
        let message = match status.canonical_reason() {
            Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        };
        CheckResult::dead(url, Some(status.as_u16()), message)
    }
}

// Categorizes reqwest errors and keeps the underlying cause chain, which is
// where the useful part usually is ("Connection refused", "dns error", ...).
fn describe_error(error: &reqwest::Error) -> String {
    let detail = error_chain(error);
    if error.is_timeout() {
        format!("Request timed out: {}", detail)
    } else if error.is_redirect() {
        format!("Too many redirects: {}", detail)
    } else if error.is_connect() {
        format!("Connection failed: {}", detail)
    } else {
        detail
    }
}

fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        // hyper and reqwest often print their cause already
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
