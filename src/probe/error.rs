use std::io;
use std::net::IpAddr;

use thiserror::Error;

use crate::dns::DnsError;
use crate::validator::DomainError;

use super::types::{AttemptStage, FailureKind, HostFailure, SmtpReply};

/// Conditions that abort a whole run. All of them are raised before any
/// identity is probed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target domain '{domain}': {source}")]
    InvalidDomain {
        domain: String,
        #[source]
        source: DomainError,
    },
    #[error("domain {domain} has no mail-exchange records")]
    NoMailExchange { domain: String },
    #[error("no mail-exchange host of {domain} resolved to an address")]
    NoResolvedHost { domain: String },
    #[error("domain {domain} accepts any recipient (catch-all confirmed by {host})")]
    DomainCatchAll { domain: String, host: IpAddr },
    #[error(transparent)]
    Dns(#[from] DnsError),
    #[error("an identity worker panicked")]
    WorkerPanicked,
}

impl ProbeError {
    /// Stable name of the condition, for reports.
    pub fn condition(&self) -> &'static str {
        match self {
            Self::InvalidDomain { .. } => "InvalidDomain",
            Self::NoMailExchange { .. } => "NoMailExchangeError",
            Self::NoResolvedHost { .. } => "NoResolvedHostError",
            Self::DomainCatchAll { .. } => "DomainCatchAllDetected",
            Self::Dns(_) => "DnsLookupError",
            Self::WorkerPanicked => "WorkerPanicked",
        }
    }

    /// The domain that triggered the condition, when known.
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::InvalidDomain { domain, .. }
            | Self::NoMailExchange { domain }
            | Self::NoResolvedHost { domain }
            | Self::DomainCatchAll { domain, .. } => Some(domain),
            Self::Dns(_) | Self::WorkerPanicked => None,
        }
    }
}

/// Why a single session stopped before running to completion.
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("{} failed: {source}", .stage.command_name())]
    Io {
        stage: AttemptStage,
        #[source]
        source: io::Error,
    },
    #[error("{} answered with {reply}", .stage.command_name())]
    Reply { stage: AttemptStage, reply: SmtpReply },
    #[error("TLS negotiation failed: {message}")]
    Tls { message: String },
}

impl SessionError {
    pub(crate) fn stage(&self) -> AttemptStage {
        match self {
            Self::Io { stage, .. } | Self::Reply { stage, .. } => *stage,
            Self::Tls { .. } => AttemptStage::StartTls,
        }
    }

    pub(crate) fn io(stage: AttemptStage) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { stage, source }
    }

    pub(crate) fn into_failure(self) -> HostFailure {
        match self {
            // a STARTTLS exchange that times out or drops is a negotiation failure
            Self::Io {
                stage: AttemptStage::StartTls,
                source,
            } => HostFailure::new(
                FailureKind::TlsNegotiation,
                AttemptStage::StartTls.command_name(),
                None,
                source.to_string(),
            ),
            Self::Io { stage, source } => {
                HostFailure::disconnected(stage.command_name(), source.to_string())
            }
            Self::Reply { stage, reply } => HostFailure::from_reply(stage.command_name(), &reply),
            Self::Tls { message } => HostFailure::new(
                FailureKind::TlsNegotiation,
                AttemptStage::StartTls.command_name(),
                None,
                message,
            ),
        }
    }
}
