#![forbid(unsafe_code)]
//! mailprobe: finds the deliverable addresses of people at a domain by
//! asking its mail hosts, without sending mail.

pub mod dns;
pub mod identity;
pub mod probe;
pub mod validator;

pub use dns::{DnsError, MailDomain, MailResolver, SystemResolver, resolve_domain};
pub use identity::{Identity, IdentityError, generate_candidates, read_identities};
pub use probe::{
    BatchReport, CandidateAddress, FailoverOutcome, FailureKind, HostFailure, HostLedger,
    IdentityReport, IdentityStatus, ProbeConfig, ProbeError, Prober, ProxyConfig, ResultSet,
    Verdict, classify, probe_domain,
};
pub use validator::{DomainError, is_valid_local_part, normalize_domain};
