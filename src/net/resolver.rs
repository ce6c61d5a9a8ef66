//! Ingest endpoint resolution

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{FtlError, Result};

/// Resolve an ingest location into candidate socket addresses
///
/// Literal IPv4/IPv6 addresses short-circuit without touching DNS.
/// Candidates come back deduplicated and IPv4-first, otherwise in resolver
/// order. Resolution errors, timeouts, and empty answers all map to
/// [`FtlError::DnsFailure`]; retry policy belongs to the caller.
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let dns_failure = || FtlError::DnsFailure {
        host: host.to_string(),
    };

    let answers = match tokio::time::timeout(limit, lookup_host((host, port))).await {
        Ok(Ok(iter)) => iter.collect(),
        Ok(Err(e)) => {
            debug!(host = %host, error = %e, "dns lookup failed");
            return Err(dns_failure());
        }
        Err(_) => {
            debug!(host = %host, limit = ?limit, "dns lookup timed out");
            return Err(dns_failure());
        }
    };

    let candidates = rank_candidates(answers);
    if candidates.is_empty() {
        return Err(dns_failure());
    }

    debug!(host = %host, candidates = candidates.len(), "resolved ingest location");
    Ok(candidates)
}

/// Deduplicate and order candidates IPv4-first, preserving resolver order
/// within each family
fn rank_candidates(answers: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let mut v4: Vec<SocketAddr> = Vec::new();
    let mut v6: Vec<SocketAddr> = Vec::new();

    for addr in answers {
        let bucket = if addr.is_ipv4() { &mut v4 } else { &mut v6 };
        if !bucket.contains(&addr) {
            bucket.push(addr);
        }
    }

    v4.extend(v6);
    v4
}
