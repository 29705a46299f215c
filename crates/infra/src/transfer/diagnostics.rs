//! Pre-flight host diagnostics: DNS resolution and a HEAD reachability probe.
//!
//! Results only feed logs and the exhaustion report. The one decision taken
//! from them is capping retries for a host that does not resolve at all.

use std::net::IpAddr;

use reqwest::Url;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostDiagnostics {
    pub host: String,
    pub ipv4: Vec<IpAddr>,
    pub ipv6: Vec<IpAddr>,
    pub dns_error: Option<String>,
    pub head_status: Option<u16>,
    pub head_error: Option<String>,
}

impl HostDiagnostics {
    pub fn dns_failed(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// First IPv4 address, else first IPv6.
    pub fn preferred_addr(&self) -> Option<IpAddr> {
        self.ipv4.first().or_else(|| self.ipv6.first()).copied()
    }
}

/// Resolve and probe the host behind `url`.
pub async fn diagnose(http: &reqwest::Client, url: &Url) -> HostDiagnostics {
    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port_or_known_default().unwrap_or(443);
    let mut diag = HostDiagnostics {
        host: host.clone(),
        ..HostDiagnostics::default()
    };

    let lookup_host = host.trim_start_matches('[').trim_end_matches(']');
    match tokio::net::lookup_host((lookup_host, port)).await {
        Ok(addrs) => {
            for addr in addrs {
                let ip = addr.ip();
                let bucket = if ip.is_ipv4() {
                    &mut diag.ipv4
                } else {
                    &mut diag.ipv6
                };
                if !bucket.contains(&ip) {
                    bucket.push(ip);
                }
            }
        }
        Err(err) => diag.dns_error = Some(err.to_string()),
    }

    if diag.dns_failed() {
        warn!(
            host = %diag.host,
            error = diag.dns_error.as_deref().unwrap_or("no addresses"),
            "DNS resolution failed"
        );
        return diag;
    }

    match http.head(url.as_str()).send().await {
        Ok(resp) => diag.head_status = Some(resp.status().as_u16()),
        Err(err) => diag.head_error = Some(err.to_string()),
    }

    info!(
        host = %diag.host,
        addr = ?diag.preferred_addr(),
        ipv4 = diag.ipv4.len(),
        ipv6 = diag.ipv6.len(),
        head_status = ?diag.head_status,
        head_error = ?diag.head_error,
        "host diagnostics"
    );
    diag
}
