use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dns::{MailResolver, SystemResolver, resolve_domain};
use crate::identity::Identity;
use crate::validator::is_valid_local_part;

use super::catchall::{CatchAllVerdict, detect_catch_all};
use super::error::ProbeError;
use super::failover::probe_candidates;
use super::options::ProbeConfig;
use super::session::SessionContext;
use super::transport::{Dialer, dialer_for, tls_connector};
use super::types::{
    BatchReport, CandidateAddress, FailoverOutcome, HostLedger, IdentityReport, IdentityStatus,
};

/// Confirmed addresses shared by every identity worker of a run.
///
/// Insertion is idempotent; the set never shrinks.
#[derive(Debug, Default)]
pub struct ResultSet {
    inner: Mutex<BTreeSet<String>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `address`; returns `false` when it was already present.
    pub fn insert(&self, address: impl Into<String>) -> bool {
        self.inner.lock().insert(address.into())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.lock().contains(address)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Sorted copy of the current content.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }
}

/// Stage of a run, as reported in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    ResolvingHosts,
    CatchAllCheck,
    ProbingIdentities,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolvingHosts => "resolving hosts",
            Self::CatchAllCheck => "catch-all check",
            Self::ProbingIdentities => "probing identities",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Drives a whole-domain run: host resolution, the catch-all check, then
/// one failover run per identity on a bounded pool of worker threads.
pub struct Prober<R> {
    config: ProbeConfig,
    resolver: R,
    dialer: Box<dyn Dialer>,
}

impl<R: MailResolver> Prober<R> {
    /// Uses a direct or SOCKS5 dialer depending on `config.proxy`.
    pub fn new(config: ProbeConfig, resolver: R) -> Self {
        let dialer = dialer_for(&config);
        Self {
            config,
            resolver,
            dialer,
        }
    }

    pub fn with_dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Box::new(dialer);
        self
    }

    pub fn run<I>(&self, identities: I) -> Result<BatchReport, ProbeError>
    where
        I: IntoIterator<Item = Identity>,
    {
        self.run_into(identities, &ResultSet::new())
    }

    /// Like [`run`](Self::run), merging confirmations into `results`.
    ///
    /// Identities are pulled lazily from `identities`; none is pulled before
    /// the catch-all check has passed. One identity's failure never stops
    /// the others: it is reported in its [`IdentityReport`].
    pub fn run_into<I>(&self, identities: I, results: &ResultSet) -> Result<BatchReport, ProbeError>
    where
        I: IntoIterator<Item = Identity>,
    {
        enter(RunPhase::ResolvingHosts, &self.config.domain);
        let domain = resolve_domain(&self.resolver, &self.config.domain, self.config.ipv6)
            .inspect_err(|err| abort(err))?;
        info!(domain = %domain.name, hosts = ?domain.hosts, "mail hosts resolved");

        let connector = if self.config.skip_tls {
            None
        } else {
            tls_connector()
        };
        let ctx = SessionContext {
            config: &self.config,
            domain: &domain.name,
            dialer: self.dialer.as_ref(),
            tls: connector.as_ref(),
        };

        enter(RunPhase::CatchAllCheck, &domain.name);
        let catch_all_ledger = match detect_catch_all(&domain.hosts, ctx) {
            CatchAllVerdict::Detected { host, address } => {
                let err = ProbeError::DomainCatchAll {
                    domain: domain.name.clone(),
                    host,
                };
                debug!(address = %address, "random recipient accepted");
                abort(&err);
                return Err(err);
            }
            CatchAllVerdict::NotDetected => None,
            CatchAllVerdict::Inconclusive { ledger } => Some(ledger),
        };

        enter(RunPhase::ProbingIdentities, &domain.name);
        let identities = fan_out(identities, &domain.hosts, ctx, results, self.config.concurrency())
            .inspect_err(|err| abort(err))?;

        let report = BatchReport {
            domain: domain.name.clone(),
            hosts: domain.hosts.clone(),
            confirmed: results.snapshot(),
            catch_all_ledger,
            identities,
        };
        enter(RunPhase::Done, &domain.name);
        info!(
            confirmed = report.confirmed.len(),
            unresolved = report.unresolved().count(),
            "run complete"
        );
        Ok(report)
    }
}

/// Probes `identities` for `config.domain` with the system DNS resolver and
/// a direct (or proxied) connection.
pub fn probe_domain<I>(config: ProbeConfig, identities: I) -> Result<BatchReport, ProbeError>
where
    I: IntoIterator<Item = Identity>,
{
    let resolver = SystemResolver::from_system_conf()?;
    Prober::new(config, resolver).run(identities)
}

fn enter(phase: RunPhase, domain: &str) {
    info!(domain, phase = %phase, "run phase");
}

fn abort(err: &ProbeError) {
    warn!(
        domain = err.domain().unwrap_or_default(),
        condition = err.condition(),
        error = %err,
        phase = %RunPhase::Aborted,
        "run aborted"
    );
}

/// Feeds identities to `workers` threads through a bounded queue and
/// returns their reports in input order.
fn fan_out<I>(
    identities: I,
    hosts: &[IpAddr],
    ctx: SessionContext<'_>,
    results: &ResultSet,
    workers: usize,
) -> Result<Vec<IdentityReport>, ProbeError>
where
    I: IntoIterator<Item = Identity>,
{
    let (job_send, job_recv) = crossbeam::channel::bounded::<(usize, Identity)>(workers);
    let (report_send, report_recv) = crossbeam::channel::unbounded();

    crossbeam::scope(|s| {
        for _ in 0..workers {
            let job_recv = job_recv.clone();
            let report_send = report_send.clone();
            s.spawn(move |_| {
                for (index, identity) in job_recv.iter() {
                    let report = probe_identity(identity, hosts, ctx, results);
                    if report_send.send((index, report)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_recv);
        drop(report_send);

        for job in identities.into_iter().enumerate() {
            if job_send.send(job).is_err() {
                warn!("all identity workers stopped, remaining identities not probed");
                break;
            }
        }
        drop(job_send);
    })
    .map_err(|_| ProbeError::WorkerPanicked)?;

    let mut reports: Vec<(usize, IdentityReport)> = report_recv.iter().collect();
    reports.sort_by_key(|(index, _)| *index);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

fn probe_identity(
    identity: Identity,
    hosts: &[IpAddr],
    ctx: SessionContext<'_>,
    results: &ResultSet,
) -> IdentityReport {
    let candidates: Vec<CandidateAddress> = identity
        .local_parts
        .iter()
        .filter(|local| {
            let valid = is_valid_local_part(local);
            if !valid {
                warn!(identity = %identity, local_part = ?local, "invalid local-part dropped");
            }
            valid
        })
        .map(|local| CandidateAddress::primary(local.as_str(), ctx.domain))
        .collect();
    if candidates.is_empty() {
        warn!(identity = %identity, "no candidate local-part, skipped");
        return IdentityReport {
            identity,
            outcome: FailoverOutcome {
                status: IdentityStatus::NotFound,
                confirmed: Vec::new(),
                ledger: HostLedger::default(),
                attempts: Vec::new(),
            },
        };
    }

    debug!(identity = %identity, candidates = candidates.len(), "probing identity");
    let outcome = probe_candidates(hosts, &candidates, ctx, true);
    for candidate in &outcome.confirmed {
        if results.insert(candidate.address()) {
            info!(identity = %identity, address = %candidate, "address confirmed");
        }
    }
    match outcome.status {
        IdentityStatus::Inconclusive | IdentityStatus::CommunicationFailure => {
            for (host, failure) in outcome.ledger.iter() {
                warn!(identity = %identity, host = %host, failure = %failure, "host failure");
            }
            warn!(identity = %identity, status = %outcome.status, "identity unresolved");
        }
        IdentityStatus::NotFound => debug!(identity = %identity, "no candidate accepted"),
        IdentityStatus::Confirmed => {}
    }

    IdentityReport { identity, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn result_set_is_idempotent_and_sorted() {
        let set = ResultSet::new();
        assert!(set.insert("jdoe@example.com"));
        assert!(set.insert("ajones@example.com"));
        assert!(!set.insert("jdoe@example.com"));
        assert_eq!(set.len(), 2);
        assert!(set.contains("ajones@example.com"));
        assert_eq!(set.snapshot(), ["ajones@example.com", "jdoe@example.com"]);
    }

    #[test]
    fn concurrent_inserts_are_lossless() {
        let set = Arc::new(ResultSet::new());
        crossbeam::scope(|s| {
            for worker in 0..8 {
                let set = Arc::clone(&set);
                s.spawn(move |_| {
                    for n in 0..50 {
                        set.insert(format!("user{}@example.com", (worker * 50 + n) % 200));
                    }
                });
            }
        })
        .expect("workers");
        assert_eq!(set.len(), 200);
    }
}
