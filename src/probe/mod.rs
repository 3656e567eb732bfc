//! SMTP recipient probing.
//!
//! [`Prober`] drives a run for one domain: it resolves the mail hosts,
//! checks once that the domain does not accept arbitrary recipients, then
//! asks the hosts about every identity's candidate addresses. Each session
//! stops at `RCPT TO`; no message is ever sent. Confirmed addresses are
//! merged into a shared [`ResultSet`] and returned in a [`BatchReport`].

mod batch;
mod catchall;
mod classify;
mod enrich;
mod error;
mod failover;
mod options;
mod session;
mod transport;
mod types;

pub use batch::{Prober, ResultSet, RunPhase, probe_domain};
pub use catchall::{CatchAllVerdict, random_local_part};
pub use classify::{ACCEPTED_RCPT_CODES, classify};
pub use enrich::{ENRICHMENT_SUFFIXES, enrichment_variants};
pub use error::ProbeError;
pub use options::{ProbeConfig, ProxyConfig};
pub use transport::{Connection, Dialer, DirectDialer, Socks5Dialer, dialer_for};
pub use types::{
    AddressOrigin, AttemptStage, BatchReport, CandidateAddress, FailoverOutcome, FailureKind,
    HostAttempt, HostFailure, HostLedger, IdentityReport, IdentityStatus, SmtpEvent, SmtpReply,
    Verdict,
};

#[cfg(test)]
mod testing;
