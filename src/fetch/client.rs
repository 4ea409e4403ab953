use crate::config::FetchConfig;
use crate::error::TollgateError;
use crate::fetch::guard::{Resolver, SystemResolver, UrlGuard, VettedTarget};
use crate::fetch::sanitize::strip_active_content;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const USER_AGENT: &str = "tollgate-fetch/0.1";

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub truncated: bool,
    pub body: String,
}

/// Fetches public URLs only. Every hop is vetted and the TCP connection is
/// pinned to the vetted addresses, so a second DNS answer cannot redirect the
/// request to an internal host.
#[derive(Clone)]
pub struct GuardedFetcher {
    guard: UrlGuard,
    resolver: Arc<dyn Resolver>,
    cfg: FetchConfig,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl GuardedFetcher {
    pub fn new(cfg: FetchConfig) -> Self {
        Self::with_resolver(cfg, Arc::new(SystemResolver))
    }

    pub fn with_resolver(cfg: FetchConfig, resolver: Arc<dyn Resolver>) -> Self {
        let per_minute = NonZeroU32::new(cfg.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            guard: UrlGuard::new(&cfg),
            resolver,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            cfg,
        }
    }

    fn build_client(&self, target: &VettedTarget) -> Result<reqwest::Client, TollgateError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(self.cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(self.cfg.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            // a proxy would resolve the name again on its side
            .no_proxy();
        if let Some(domain) = &target.domain {
            builder = builder.resolve_to_addrs(domain, &target.addrs);
        }
        Ok(builder.build()?)
    }

    /// Client pinned to the target's addresses plus the request for its URL.
    /// The request host is always the pinned name.
    fn prepare(
        &self,
        target: &VettedTarget,
    ) -> Result<(reqwest::Client, reqwest::Request), TollgateError> {
        let client = self.build_client(target)?;
        let request = client.get(target.url.clone()).build()?;
        Ok((client, request))
    }

    /// Resolve a redirect against the current URL and vet it like a fresh
    /// request.
    async fn next_hop(
        &self,
        from: &Url,
        location: &str,
        hops: usize,
    ) -> Result<VettedTarget, TollgateError> {
        if hops > self.cfg.max_redirects {
            return Err(TollgateError::Upstream(format!(
                "more than {} redirects",
                self.cfg.max_redirects
            )));
        }
        let next = from.join(location)?;
        debug!(next = %next, hops, "following redirect");
        self.guard.vet(&next, self.resolver.as_ref()).await
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<FetchOutcome, TollgateError> {
        if self.limiter.check().is_err() {
            return Err(TollgateError::RateLimited);
        }

        let original = Url::parse(raw_url.trim())?;
        let mut target = self.guard.vet(&original, self.resolver.as_ref()).await?;
        let mut hops = 0usize;

        let response = loop {
            let (client, request) = self.prepare(&target)?;
            debug!(url = %target.url, addrs = ?target.addrs, "fetching vetted url");

            let resp = client.execute(request).await?;
            if !resp.status().is_redirection() {
                break resp;
            }

            let Some(location) = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                break resp;
            };
            hops += 1;
            let next = self.next_hop(&target.url, location, hops).await?;
            target = next;
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let (bytes, truncated) = read_capped(response, self.cfg.max_body_bytes).await?;
        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if self.cfg.strip_active_content && content_type.to_ascii_lowercase().contains("html") {
            body = strip_active_content(&body);
        }

        if truncated {
            warn!(url = %target.url, limit = self.cfg.max_body_bytes, "fetched body truncated");
        }
        info!(url = %original, final_url = %target.url, status, hops, "fetch complete");

        Ok(FetchOutcome {
            url: original.to_string(),
            final_url: target.url.to_string(),
            status,
            content_type,
            truncated,
            body,
        })
    }
}

async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), TollgateError> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(buf.len());
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}
