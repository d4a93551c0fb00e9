// src/checker/transport.rs
// =============================================================================
// This module decides HOW a probe reaches its target.
//
// Two transports exist:
// - Direct: a normal reqwest client, straight out of the network interface
// - Proxied: a reqwest client whose every request goes through a SOCKS proxy
//
// Hosts under the `.onion` top-level suffix always take the proxied route.
// Going direct would leak the origin of the check and, in practice, could not
// even resolve the name. There is no fallback from Proxied to Direct.
//
// The choice is a pure function of the parsed host, made once per probe.
// A redirect can still point a clearnet URL at an onion host, so the direct
// client refuses to follow such a hop itself and reports the target as an
// OnionRedirect error instead. The prober then continues over the proxy.
// =============================================================================

use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Redirect hops a single probe will follow.
pub const MAX_REDIRECTS: usize = 5;

/// Reserved top-level suffix of anonymity-network hosts.
pub const ONION_SUFFIX: &str = ".onion";

/// Which network path a probe must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxied,
}

impl Route {
    /// Picks the route for a parsed URL.
    pub fn for_url(url: &Url) -> Self {
        if is_onion_host(url) {
            Route::Proxied
        } else {
            Route::Direct
        }
    }
}

/// True when the host ends in `.onion` (case-insensitive, trailing dot allowed).
pub fn is_onion_host(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => {
            let host = host.trim_end_matches('.').to_ascii_lowercase();
            host.ends_with(ONION_SUFFIX)
        }
        None => false,
    }
}

/// Raised by the direct client when a redirect points at an onion host.
#[derive(Debug, Error)]
#[error("Redirect to onion host {target} needs the SOCKS proxy")]
pub struct OnionRedirect {
    pub target: Url,
}

impl OnionRedirect {
    /// Finds an `OnionRedirect` anywhere in the source chain of `error`.
    pub fn find<'a>(error: &'a (dyn std::error::Error + 'static)) -> Option<&'a OnionRedirect> {
        let mut current = Some(error);
        while let Some(err) = current {
            if let Some(redirect) = err.downcast_ref::<OnionRedirect>() {
                return Some(redirect);
            }
            current = err.source();
        }
        None
    }
}

/// A ready-to-use HTTP client for one route.
#[derive(Debug, Clone)]
pub enum Transport {
    Direct(Client),
    Proxied { client: Client, endpoint: String },
}

impl Transport {
    /// Client that talks to hosts directly.
    pub fn direct(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        // Ignore HTTP_PROXY and friends: direct means direct
        let client = base_client(timeout, user_agent)
            .no_proxy()
            .redirect(direct_redirect_policy())
            .build()?;
        Ok(Transport::Direct(client))
    }

    /// Client that sends everything through the SOCKS proxy at `endpoint`.
    ///
    /// Use a `socks5h://` endpoint so name resolution happens on the proxy side.
    pub fn proxied(
        endpoint: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = base_client(timeout, user_agent)
            .proxy(Proxy::all(endpoint)?)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Transport::Proxied {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn client(&self) -> &Client {
        match self {
            Transport::Direct(client) => client,
            Transport::Proxied { client, .. } => client,
        }
    }

    pub fn route(&self) -> Route {
        match self {
            Transport::Direct(_) => Route::Direct,
            Transport::Proxied { .. } => Route::Proxied,
        }
    }

    /// Turns a failure description into the message stored on the link.
    ///
    /// Proxied failures are tagged with the proxy endpoint, so an operator can
    /// tell "the onion service is down" from "Tor is not running".
    pub fn describe_failure(&self, detail: &str) -> String {
        match self {
            Transport::Direct(_) => detail.to_string(),
            Transport::Proxied { endpoint, .. } => {
                format!("SOCKS proxy {} failed: {}", endpoint, detail)
            }
        }
    }
}

fn base_client(timeout: Duration, user_agent: &str) -> reqwest::ClientBuilder {
    Client::builder().timeout(timeout).user_agent(user_agent)
}

// Same hop limit as Policy::limited, but never follows a hop onto an onion host
fn direct_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if is_onion_host(attempt.url()) {
            let target = attempt.url().clone();
            attempt.error(OnionRedirect { target })
        } else {
            attempt.follow()
        }
    })
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. socks5 vs socks5h?
//    - socks5: the client resolves the hostname, then asks the proxy for an IP
//    - socks5h: the hostname itself is sent to the proxy ("h" = host)
//    - .onion names only exist inside Tor, so they need socks5h
//
// 2. Why a custom redirect policy on the direct client only?
//    - The proxied client already sends every hop through the proxy
//    - The direct client would resolve an onion hop with the system resolver
//    - attempt.error(...) stops the chain; the prober finds OnionRedirect in
//      the error's source chain and re-sends the request over the proxy
//
// 3. Why keep two Clients instead of building one per request?
//    - A reqwest Client holds a connection pool; building one is not free
//    - Clone on Client is cheap (it is an Arc inside)
// -----------------------------------------------------------------------------
