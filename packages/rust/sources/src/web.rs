//! Plain web page fetcher for links found in documents.
//!
//! Links come from user-authored documents, so requests to private or
//! local addresses are refused, including every redirect hop.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, instrument};
use url::{Host, Url};

use autoblog_shared::{AutoblogError, Result};

use crate::USER_AGENT;

const MAX_REDIRECTS: usize = 5;

/// Fetches pages and reduces them to prompt text.
pub struct WebPageFetcher {
    client: Client,
    /// Addresses that may not be requested, directly or through a redirect.
    is_blocked: fn(&Url) -> bool,
}

impl WebPageFetcher {
    pub fn new() -> Result<Self> {
        Self::with_guard(is_ssrf_target)
    }

    fn with_guard(is_blocked: fn(&Url) -> bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(is_blocked))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AutoblogError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, is_blocked })
    }

    /// Allow fetching localhost/private IPs (for tests with mock servers).
    #[cfg(test)]
    pub(crate) fn allow_private(self) -> Self {
        Self::with_guard(|_| false).expect("client")
    }

    /// Fetch `url` and return its main content as text.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| AutoblogError::validation(format!("invalid URL '{url}': {e}")))?;
        if (self.is_blocked)(&parsed) {
            return Err(AutoblogError::validation(format!(
                "refusing to fetch non-public address {url}"
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AutoblogError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AutoblogError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AutoblogError::Network(format!("{url}: body read failed: {e}")))?;
        debug!(bytes = body.len(), "page fetched");

        autoblog_markdown::page_text(&body)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Follow at most [`MAX_REDIRECTS`] hops, refusing any blocked target.
fn redirect_policy(is_blocked: fn(&Url) -> bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if is_blocked(attempt.url()) {
            let msg = format!("refusing redirect to non-public address {}", attempt.url());
            attempt.error(msg)
        } else {
            attempt.follow()
        }
    })
}

/// Whether a URL points at something other than a public HTTP(S) host.
fn is_ssrf_target(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }

    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (a == 100 && (b & 0xC0) == 64)
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
