use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} lookup failed for {name}: {source}")]
    Lookup {
        kind: &'static str,
        name: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
}

impl DnsError {
    pub(crate) fn resolver_init(source: std::io::Error) -> Self {
        Self::ResolverInit { source }
    }

    pub(crate) fn lookup(
        kind: &'static str,
        name: impl Into<String>,
        source: trust_dns_resolver::error::ResolveError,
    ) -> Self {
        Self::Lookup {
            kind,
            name: name.into(),
            source,
        }
    }
}
