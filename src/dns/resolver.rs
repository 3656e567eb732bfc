use std::net::IpAddr;

use trust_dns_resolver::{
    Resolver,
    error::{ResolveError, ResolveErrorKind},
};

use super::DnsError;

/// Name resolution needed before any protocol I/O.
///
/// Both lookups return `Ok(None)` when the name has no record of the
/// requested type, so callers can tell "absent" apart from a resolver
/// failure.
pub trait MailResolver {
    /// Mail-exchange hostnames for `domain`, in the order the resolver
    /// returned them.
    fn resolve_mail_hosts(&self, domain: &str) -> Result<Option<Vec<String>>, DnsError>;

    /// Addresses of one mail-exchange hostname.
    fn resolve_addresses(&self, host: &str) -> Result<Option<Vec<IpAddr>>, DnsError>;
}

/// [`MailResolver`] backed by the system resolver configuration.
pub struct SystemResolver {
    inner: Resolver,
}

impl SystemResolver {
    pub fn from_system_conf() -> Result<Self, DnsError> {
        let inner = Resolver::from_system_conf().map_err(DnsError::resolver_init)?;
        Ok(Self { inner })
    }
}

impl MailResolver for SystemResolver {
    fn resolve_mail_hosts(&self, domain: &str) -> Result<Option<Vec<String>>, DnsError> {
        let lookup = match self.inner.mx_lookup(domain) {
            Ok(lookup) => lookup,
            Err(err) if is_no_records(&err) || is_unanswered(&err) => return Ok(None),
            Err(err) => return Err(DnsError::lookup("MX", domain, err)),
        };
        let hosts: Vec<String> = lookup
            .iter()
            .map(|mx| normalize_exchange(mx.exchange().to_utf8()))
            .filter(|exchange| !exchange.is_empty())
            .collect();
        Ok(if hosts.is_empty() { None } else { Some(hosts) })
    }

    fn resolve_addresses(&self, host: &str) -> Result<Option<Vec<IpAddr>>, DnsError> {
        let lookup = match self.inner.lookup_ip(host) {
            Ok(lookup) => lookup,
            Err(err) if is_no_records(&err) => return Ok(None),
            Err(err) => return Err(DnsError::lookup("address", host, err)),
        };
        let addrs: Vec<IpAddr> = lookup.iter().collect();
        Ok(if addrs.is_empty() { None } else { Some(addrs) })
    }
}

fn is_no_records(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// No nameserver could be reached for the query. For MX lookups this is
/// reported as a domain without mail exchanges.
fn is_unanswered(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoConnections)
}

/// Strips the root dot of an exchange name and lower-cases it.
pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}
