use std::net::IpAddr;

use tracing::{debug, warn};

use crate::probe::ProbeError;
use crate::validator::normalize_domain;

use super::MailResolver;

/// A target domain together with the mail-host addresses to probe, in
/// discovery order.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailDomain {
    /// ASCII (IDNA) form of the domain.
    pub name: String,
    pub hosts: Vec<IpAddr>,
}

/// Resolves `domain` to its mail-host addresses.
///
/// Hostnames keep the order the resolver returned them in, not their MX
/// preference. Addresses are deduplicated across hostnames. A hostname
/// that does not resolve, or whose lookup fails, is logged and skipped.
pub fn resolve_domain<R: MailResolver + ?Sized>(
    resolver: &R,
    domain: &str,
    ipv6: bool,
) -> Result<MailDomain, ProbeError> {
    let name = normalize_domain(domain).map_err(|source| ProbeError::InvalidDomain {
        domain: domain.to_string(),
        source,
    })?;

    let exchanges = match resolver.resolve_mail_hosts(&name)? {
        Some(exchanges) if !exchanges.is_empty() => exchanges,
        _ => return Err(ProbeError::NoMailExchange { domain: name }),
    };
    debug!(domain = %name, exchanges = ?exchanges, "mail exchanges resolved");

    let mut hosts: Vec<IpAddr> = Vec::new();
    for exchange in &exchanges {
        let addrs = match resolver.resolve_addresses(exchange) {
            Ok(Some(addrs)) => addrs,
            Ok(None) => {
                warn!(exchange = %exchange, "mail exchange has no address records");
                continue;
            }
            Err(err) => {
                warn!(exchange = %exchange, error = %err, "address lookup failed");
                continue;
            }
        };
        for addr in addrs {
            if addr.is_ipv6() && !ipv6 {
                continue;
            }
            if !hosts.contains(&addr) {
                hosts.push(addr);
            }
        }
    }

    if hosts.is_empty() {
        return Err(ProbeError::NoResolvedHost { domain: name });
    }
    Ok(MailDomain { name, hosts })
}
