use std::collections::HashSet;
use std::net::IpAddr;

use tracing::{debug, info};

use super::session::{SessionContext, probe_host};
use super::types::{CandidateAddress, FailoverOutcome, HostLedger, IdentityStatus};

/// Tries `hosts` strictly in order with one session each, and stops at the
/// first host that confirms at least one candidate.
pub(crate) fn probe_candidates(
    hosts: &[IpAddr],
    candidates: &[CandidateAddress],
    ctx: SessionContext<'_>,
    enrich: bool,
) -> FailoverOutcome {
    let mut ledger = HostLedger::default();
    let mut attempts = Vec::with_capacity(hosts.len());
    let mut confirmed: Vec<CandidateAddress> = Vec::new();

    for &host in hosts {
        let attempt = probe_host(host, candidates, ctx, enrich);
        if let Some(failure) = attempt.ledger_entry() {
            debug!(host = %host, failure = %failure, "host recorded in ledger");
            ledger.record(host, failure.clone());
        }
        let mut seen = HashSet::new();
        confirmed = attempt
            .confirmed
            .iter()
            .filter(|candidate| seen.insert(candidate.address()))
            .cloned()
            .collect();
        attempts.push(attempt);
        if !confirmed.is_empty() {
            info!(host = %host, confirmed = confirmed.len(), "host confirmed candidates");
            break;
        }
    }

    let status = status_for(&confirmed, &ledger);
    FailoverOutcome {
        status,
        confirmed,
        ledger,
        attempts,
    }
}

fn status_for(confirmed: &[CandidateAddress], ledger: &HostLedger) -> IdentityStatus {
    if !confirmed.is_empty() {
        IdentityStatus::Confirmed
    } else if ledger.has_temporary() {
        IdentityStatus::Inconclusive
    } else if !ledger.is_empty() {
        IdentityStatus::CommunicationFailure
    } else {
        IdentityStatus::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::types::{FailureKind, HostFailure};

    fn host(last: u8) -> IpAddr {
        IpAddr::from([192, 0, 2, last])
    }

    #[test]
    fn status_prefers_confirmation_over_ledger() {
        let mut ledger = HostLedger::default();
        ledger.record(host(1), HostFailure::disconnected("connect", "refused"));
        let confirmed = [CandidateAddress::primary("jdoe", "example.com")];
        assert_eq!(status_for(&confirmed, &ledger), IdentityStatus::Confirmed);
        assert_eq!(status_for(&[], &ledger), IdentityStatus::Inconclusive);
    }

    #[test]
    fn fatal_only_ledger_is_a_communication_failure() {
        let mut ledger = HostLedger::default();
        ledger.record(
            host(1),
            HostFailure::new(FailureKind::ProtocolFatal, "MAIL FROM", Some(553), "no"),
        );
        assert_eq!(status_for(&[], &ledger), IdentityStatus::CommunicationFailure);
        assert_eq!(status_for(&[], &HostLedger::default()), IdentityStatus::NotFound);
    }
}
