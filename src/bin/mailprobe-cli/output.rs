use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result, bail};
use mailprobe::{BatchReport, IdentityReport, IdentityStatus};

use crate::args::Cli;

pub fn write_report(report: &BatchReport, cli: &Cli) -> Result<()> {
    let data = match cli.format.as_str() {
        "human" => render_human(report).into_bytes(),
        "json" => render_json(report)?,
        "csv" => render_csv(report)?,
        other => bail!("unknown --format '{other}', use: human|json|csv"),
    };
    match &cli.out {
        Some(path) => write_all_atomically(path, &data),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

/// Run completed, but some identity could not be settled.
pub fn any_unresolved(report: &BatchReport) -> bool {
    report.unresolved().next().is_some()
}

fn status_tag(status: IdentityStatus) -> &'static str {
    match status {
        IdentityStatus::Confirmed => "[OK]",
        IdentityStatus::NotFound => "[NOT FOUND]",
        IdentityStatus::Inconclusive => "[INCONCLUSIVE]",
        IdentityStatus::CommunicationFailure => "[FAILED]",
    }
}

fn confirmed_addresses(report: &IdentityReport) -> Vec<String> {
    report
        .outcome
        .confirmed
        .iter()
        .map(|candidate| candidate.address())
        .collect()
}

pub fn render_human(report: &BatchReport) -> String {
    let mut out = String::new();
    let hosts: Vec<String> = report.hosts.iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "domain: {} ({})", report.domain, hosts.join(", "));
    if let Some(ledger) = &report.catch_all_ledger {
        let _ = writeln!(out, "catch-all check inconclusive");
        for (host, failure) in ledger.iter() {
            let _ = writeln!(out, "        {host}: {failure}");
        }
    }

    for identity in &report.identities {
        let tag = status_tag(identity.outcome.status);
        let addresses = confirmed_addresses(identity);
        if addresses.is_empty() {
            let _ = writeln!(out, "{tag:<15}{}", identity.identity);
        } else {
            let _ = writeln!(
                out,
                "{tag:<15}{} :: {}",
                identity.identity,
                addresses.join(", ")
            );
        }
        // hosts and codes seen, only for identities left unsettled
        if identity.outcome.status.is_unresolved() {
            for (host, failure) in identity.outcome.ledger.iter() {
                let _ = writeln!(out, "        {host}: {failure}");
            }
        }
    }

    let _ = writeln!(out, "confirmed: {}", report.confirmed.len());
    for address in &report.confirmed {
        let _ = writeln!(out, "  {address}");
    }
    out
}

#[cfg(feature = "with-serde")]
fn render_json(report: &BatchReport) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(report)?;
    data.push(b'\n');
    Ok(data)
}

#[cfg(not(feature = "with-serde"))]
fn render_json(_: &BatchReport) -> Result<Vec<u8>> {
    bail!("format=json requires the 'with-serde' feature")
}

/// One row per confirmed address, or one empty-address row for an identity
/// without confirmation.
fn render_csv(report: &BatchReport) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["first", "last", "status", "address"])?;
    for identity in &report.identities {
        let status = identity.outcome.status.to_string();
        let addresses = confirmed_addresses(identity);
        if addresses.is_empty() {
            wtr.write_record([
                identity.identity.first.as_str(),
                identity.identity.last.as_str(),
                status.as_str(),
                "",
            ])?;
        }
        for address in &addresses {
            wtr.write_record([
                identity.identity.first.as_str(),
                identity.identity.last.as_str(),
                status.as_str(),
                address.as_str(),
            ])?;
        }
    }
    wtr.into_inner().context("flushing CSV output")
}

fn write_all_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    {
        let mut f = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", Path::new(&tmp).display()))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailprobe::{
        CandidateAddress, FailoverOutcome, FailureKind, HostFailure, HostLedger, Identity,
    };

    fn outcome(
        status: IdentityStatus,
        confirmed: &[&str],
        ledger: HostLedger,
    ) -> FailoverOutcome {
        FailoverOutcome {
            status,
            confirmed: confirmed
                .iter()
                .map(|local| CandidateAddress::primary(*local, "example.com"))
                .collect(),
            ledger,
            attempts: Vec::new(),
        }
    }

    fn sample_report() -> BatchReport {
        let mx1 = "192.0.2.10".parse().expect("ip");
        let mx2 = "192.0.2.20".parse().expect("ip");

        let mut greylisted = HostLedger::default();
        greylisted.record(
            mx1,
            HostFailure::new(FailureKind::Temporary, "RCPT TO", Some(451), "try later"),
        );
        greylisted.record(
            mx2,
            HostFailure::new(FailureKind::TlsNegotiation, "STARTTLS", None, "handshake failed"),
        );

        BatchReport {
            domain: "example.com".to_string(),
            hosts: vec![mx1, mx2],
            confirmed: vec!["jdoe@example.com".to_string(), "jdoe2@example.com".to_string()],
            catch_all_ledger: None,
            identities: vec![
                IdentityReport {
                    identity: Identity::new("John", "Doe"),
                    outcome: outcome(
                        IdentityStatus::Confirmed,
                        &["jdoe", "jdoe2"],
                        HostLedger::default(),
                    ),
                },
                IdentityReport {
                    identity: Identity::new("Jane", "Smith"),
                    outcome: outcome(IdentityStatus::Inconclusive, &[], greylisted),
                },
                IdentityReport {
                    identity: Identity::new("Ann", "Lee"),
                    outcome: outcome(IdentityStatus::NotFound, &[], HostLedger::default()),
                },
            ],
        }
    }

    #[test]
    fn human_report_lists_unresolved_hosts() {
        insta::assert_snapshot!(render_human(&sample_report()), @r"
        domain: example.com (192.0.2.10, 192.0.2.20)
        [OK]           John Doe :: jdoe@example.com, jdoe2@example.com
        [INCONCLUSIVE] Jane Smith
                192.0.2.10: RCPT TO: 451 try later
                192.0.2.20: STARTTLS: handshake failed
        [NOT FOUND]    Ann Lee
        confirmed: 2
          jdoe@example.com
          jdoe2@example.com
        ");
    }

    #[test]
    fn human_report_flags_unsettled_catch_all_check() {
        let mut report = sample_report();
        let mut ledger = HostLedger::default();
        ledger.record(
            report.hosts[0],
            HostFailure::new(FailureKind::Temporary, "connect", Some(451), "connection refused"),
        );
        report.catch_all_ledger = Some(ledger);
        report.identities.clear();

        insta::assert_snapshot!(render_human(&report), @r"
        domain: example.com (192.0.2.10, 192.0.2.20)
        catch-all check inconclusive
                192.0.2.10: connect: 451 connection refused
        confirmed: 2
          jdoe@example.com
          jdoe2@example.com
        ");
    }

    #[test]
    fn csv_report_has_one_row_per_address() {
        let data = render_csv(&sample_report()).expect("csv");
        let text = String::from_utf8(data).expect("utf8");
        insta::assert_snapshot!(text, @r"
        first,last,status,address
        John,Doe,confirmed,jdoe@example.com
        John,Doe,confirmed,jdoe2@example.com
        Jane,Smith,inconclusive,
        Ann,Lee,not found,
        ");
    }

    #[test]
    fn exit_status_tracks_unresolved_identities() {
        let mut report = sample_report();
        assert!(any_unresolved(&report));
        report.identities.retain(|id| !id.outcome.status.is_unresolved());
        assert!(!any_unresolved(&report));
    }
}
