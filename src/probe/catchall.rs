use std::net::IpAddr;

use rand::{Rng, distributions::Alphanumeric};
use tracing::{info, warn};

use super::failover::probe_candidates;
use super::session::SessionContext;
use super::types::{CandidateAddress, HostLedger, IdentityStatus};

/// Length of the random local-part; 36^24 possibilities.
const PROBE_LOCAL_LEN: usize = 24;

/// A lower-case alphanumeric local-part no real mailbox will have.
pub fn random_local_part() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PROBE_LOCAL_LEN)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchAllVerdict {
    /// `host` accepted a recipient that cannot exist.
    Detected { host: IpAddr, address: String },
    /// Every host refused the random recipient.
    NotDetected,
    /// No host confirmed, but at least one ended on a failure. Not fatal.
    Inconclusive { ledger: HostLedger },
}

/// Runs one random recipient through host failover as a one-candidate
/// identity. Enrichment is off.
pub(crate) fn detect_catch_all(hosts: &[IpAddr], ctx: SessionContext<'_>) -> CatchAllVerdict {
    let candidate = CandidateAddress::primary(random_local_part(), ctx.domain);
    let outcome = probe_candidates(hosts, std::slice::from_ref(&candidate), ctx, false);

    match (outcome.status, outcome.attempts.last()) {
        (IdentityStatus::Confirmed, Some(attempt)) => {
            info!(domain = ctx.domain, host = %attempt.host, "domain accepts any recipient");
            CatchAllVerdict::Detected {
                host: attempt.host,
                address: candidate.address(),
            }
        }
        (IdentityStatus::Confirmed | IdentityStatus::NotFound, _) => CatchAllVerdict::NotDetected,
        (IdentityStatus::Inconclusive | IdentityStatus::CommunicationFailure, _) => {
            warn!(
                domain = ctx.domain,
                hosts = outcome.ledger.len(),
                "catch-all check inconclusive, continuing"
            );
            CatchAllVerdict::Inconclusive {
                ledger: outcome.ledger,
            }
        }
    }
}
