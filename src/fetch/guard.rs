use crate::config::FetchConfig;
use crate::error::TollgateError;
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use url::{Host, Url};

const INTERNAL_SUFFIXES: [&str; 5] = [".local", ".internal", ".localhost", ".lan", ".home.arpa"];

/// DNS seam so address vetting can be exercised without a network.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// A URL that passed every check, with the addresses it may be reached at.
#[derive(Debug, Clone, PartialEq)]
pub struct VettedTarget {
    pub url: Url,
    /// Set for DNS names; IP-literal URLs need no pinning.
    pub domain: Option<String>,
    pub port: u16,
    pub addrs: Vec<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct UrlGuard {
    schemes: Vec<String>,
    ports: Vec<u16>,
    blocked_hosts: Vec<String>,
}

fn blocked(reason: impl Into<String>) -> TollgateError {
    TollgateError::UrlBlocked(reason.into())
}

impl UrlGuard {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            schemes: cfg
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            ports: cfg.allowed_ports.clone(),
            blocked_hosts: cfg
                .blocked_hosts
                .iter()
                .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Checks that need no DNS: scheme, credentials, port, host names and IP
    /// literals.
    pub fn check_static(&self, url: &Url) -> Result<(), TollgateError> {
        if !self.schemes.iter().any(|s| s == url.scheme()) {
            return Err(blocked(format!("scheme '{}' is not allowed", url.scheme())));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(blocked("credentials in URLs are not allowed"));
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| blocked("URL has no port"))?;
        if !self.ports.contains(&port) {
            return Err(blocked(format!("port {port} is not allowed")));
        }

        match url.host() {
            None => Err(blocked("URL has no host")),
            Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => self.check_domain(domain),
        }
    }

    fn check_domain(&self, domain: &str) -> Result<(), TollgateError> {
        let host = domain.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return Err(blocked("URL has no host"));
        }
        if host == "localhost" || self.blocked_hosts.iter().any(|b| *b == host) {
            return Err(blocked(format!("access to internal host '{host}' is blocked")));
        }
        if INTERNAL_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            return Err(blocked(format!(
                "access to internal domain '{host}' is blocked"
            )));
        }
        // a dotless name only resolves through local search domains
        if !host.contains('.') {
            return Err(blocked(format!("single-label host '{host}' is blocked")));
        }
        Ok(())
    }

    /// Full check: static rules, then every resolved address must be public.
    pub async fn vet(
        &self,
        url: &Url,
        resolver: &dyn Resolver,
    ) -> Result<VettedTarget, TollgateError> {
        self.check_static(url)?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| blocked("URL has no port"))?;

        let mut url = url.clone();
        let (domain, addrs) = match url.host() {
            Some(Host::Ipv4(ip)) => (None, vec![SocketAddr::new(IpAddr::V4(ip), port)]),
            Some(Host::Ipv6(ip)) => (None, vec![SocketAddr::new(IpAddr::V6(ip), port)]),
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                let addrs = resolver.resolve(&domain, port).await.map_err(|e| {
                    TollgateError::Upstream(format!("could not resolve '{domain}': {e}"))
                })?;
                if addrs.is_empty() {
                    return Err(TollgateError::Upstream(format!(
                        "'{domain}' has no addresses"
                    )));
                }
                for addr in &addrs {
                    if !is_public_ip(addr.ip()) {
                        return Err(blocked(format!(
                            "'{domain}' resolves to non-public address {}",
                            addr.ip()
                        )));
                    }
                }
                (Some(domain), addrs)
            }
            None => return Err(blocked("URL has no host")),
        };
        // The pinned name and the request host must be the same string.
        if let Some(domain) = &domain {
            url.set_host(Some(domain))?;
        }

        Ok(VettedTarget {
            url,
            domain,
            port,
            addrs,
        })
    }
}

fn check_ip(ip: IpAddr) -> Result<(), TollgateError> {
    if is_public_ip(ip) {
        Ok(())
    } else {
        Err(blocked(format!("address {ip} is not publicly routable")))
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || a == 0
        // shared address space 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
        // IETF protocol assignments 192.0.0.0/24
        || (a == 192 && b == 0 && ip.octets()[2] == 0)
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b & 0xfe) == 18)
        // reserved 240.0.0.0/4
        || a >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(v4);
    }
    let seg = ip.segments();
    // IPv4-compatible ::a.b.c.d
    if seg[..6].iter().all(|s| *s == 0) && !ip.is_loopback() && !ip.is_unspecified() {
        return is_public_v4(Ipv4Addr::from(((seg[6] as u32) << 16) | seg[7] as u32));
    }
    // NAT64 64:ff9b::/96
    if seg[0] == 0x64 && seg[1] == 0xff9b && seg[2..6].iter().all(|s| *s == 0) {
        return is_public_v4(Ipv4Addr::from(((seg[6] as u32) << 16) | seg[7] as u32));
    }
    // 6to4 2002::/16 embeds the IPv4 address in the next 32 bits
    if seg[0] == 0x2002 {
        return is_public_v4(Ipv4Addr::from(((seg[1] as u32) << 16) | seg[2] as u32));
    }
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // unique local fc00::/7
        || (seg[0] & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (seg[0] & 0xffc0) == 0xfe80
        // deprecated site-local fec0::/10
        || (seg[0] & 0xffc0) == 0xfec0
        // documentation 2001:db8::/32
        || (seg[0] == 0x2001 && seg[1] == 0x0db8)
        // discard-only 100::/64
        || (seg[0] == 0x100 && seg[1..4].iter().all(|s| *s == 0)))
}

/// Whether an address is globally routable and safe to contact.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}
