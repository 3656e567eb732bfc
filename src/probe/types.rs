use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use crate::identity::Identity;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    Connect,
    Greeting,
    Ehlo,
    Helo,
    StartTls,
    MailFrom,
    RcptTo,
    Enrichment,
    Quit,
}

impl AttemptStage {
    /// Name of the protocol step, as shown in ledgers and reports.
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::Helo => "HELO",
            Self::StartTls => "STARTTLS",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo | Self::Enrichment => "RCPT TO",
            Self::Quit => "QUIT",
        }
    }
}

/// A raw SMTP reply, preserving the numeric status code and message text.
/// Multi-line replies keep one text line per protocol line.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 4xx: the command may succeed if repeated later.
    pub fn is_deferral(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx, or a code past the defined classes.
    pub fn is_refusal(&self) -> bool {
        self.code >= 500
    }

    /// Whether an EHLO reply advertises `keyword`. The first line is the
    /// server greeting and never an extension.
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.message.lines().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(keyword))
        })
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message.replace('\n', " / "))
    }
}

/// A recorded `SMTP` transcript event used for diagnostics.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpEvent {
    Sent {
        stage: AttemptStage,
        command: String,
    },
    Received {
        stage: AttemptStage,
        reply: SmtpReply,
    },
    Error {
        stage: AttemptStage,
        message: String,
    },
}

/// Deliverability category of one recipient-acceptance exchange.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Rejected,
    Temporary { code: u16, text: String },
    ProtocolFatal { code: u16, text: String },
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressOrigin {
    /// Derived from the identity's name.
    Primary,
    /// Digit-suffixed variant of a confirmed primary.
    Enriched,
}

/// `local-part@domain` under test. Two candidates are equal when their
/// address strings are, whatever their origin.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct CandidateAddress {
    local: String,
    domain: String,
    origin: AddressOrigin,
}

impl CandidateAddress {
    pub fn primary(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
            origin: AddressOrigin::Primary,
        }
    }

    pub fn enriched(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
            origin: AddressOrigin::Enriched,
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn origin(&self) -> AddressOrigin {
        self.origin
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

impl PartialEq for CandidateAddress {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.domain == other.domain
    }
}

impl Eq for CandidateAddress {}

impl Hash for CandidateAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.domain.hash(state);
    }
}

impl fmt::Display for CandidateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Host-level condition that ended (or clouded) one session.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// `HostTemporaryFailure`: 4xx replies, unreachable host, lost
    /// connection or timeout.
    Temporary,
    /// `HostProtocolFatal`: a 5xx reply before any recipient was asked for.
    ProtocolFatal,
    /// `TransportSecurityNegotiationFailed`: STARTTLS handshake error or
    /// timeout. Counts as temporary.
    TlsNegotiation,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub kind: FailureKind,
    pub command: String,
    pub code: Option<u16>,
    pub message: String,
}

impl HostFailure {
    /// Code recorded when the host could not be reached or dropped the
    /// connection.
    pub const UNREACHABLE_CODE: u16 = 451;

    pub fn new(
        kind: FailureKind,
        command: impl Into<String>,
        code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            command: command.into(),
            code,
            message: message.into(),
        }
    }

    pub(crate) fn from_reply(command: impl Into<String>, reply: &SmtpReply) -> Self {
        let kind = if reply.is_refusal() {
            FailureKind::ProtocolFatal
        } else {
            FailureKind::Temporary
        };
        Self::new(kind, command, Some(reply.code), reply.message.clone())
    }

    pub(crate) fn disconnected(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Temporary,
            command,
            Some(Self::UNREACHABLE_CODE),
            message,
        )
    }

    pub fn is_temporary(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Temporary | FailureKind::TlsNegotiation
        )
    }
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}: {} {}", self.command, code, self.message),
            None => write!(f, "{}: {}", self.command, self.message),
        }
    }
}

/// Last failure seen per mail host while probing one identity.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostLedger {
    entries: Vec<(IpAddr, HostFailure)>,
}

impl HostLedger {
    /// Records `failure` for `host`, replacing any earlier entry for it.
    pub fn record(&mut self, host: IpAddr, failure: HostFailure) {
        match self.entries.iter_mut().find(|(seen, _)| *seen == host) {
            Some(entry) => entry.1 = failure,
            None => self.entries.push((host, failure)),
        }
    }

    pub fn get(&self, host: &IpAddr) -> Option<&HostFailure> {
        self.entries
            .iter()
            .find(|(seen, _)| seen == host)
            .map(|(_, failure)| failure)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IpAddr, &HostFailure)> {
        self.entries.iter().map(|(host, failure)| (host, failure))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has_temporary(&self) -> bool {
        self.entries.iter().any(|(_, failure)| failure.is_temporary())
    }
}

/// Detailed report for one session against one mail host.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAttempt {
    pub host: IpAddr,
    pub encrypted: bool,
    pub events: Vec<SmtpEvent>,
    pub confirmed: Vec<CandidateAddress>,
    /// Set when the session was cut short.
    pub failure: Option<HostFailure>,
    /// Last temporary reply to an individual recipient.
    pub last_temporary: Option<HostFailure>,
}

impl HostAttempt {
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            encrypted: false,
            events: Vec::new(),
            confirmed: Vec::new(),
            failure: None,
            last_temporary: None,
        }
    }

    /// The condition worth recording in the ledger for this host, if any.
    pub fn ledger_entry(&self) -> Option<&HostFailure> {
        self.failure.as_ref().or(self.last_temporary.as_ref())
    }
}

/// How probing ended for one identity once hosts were tried.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    /// At least one candidate was accepted.
    Confirmed,
    /// Every candidate was refused without any host-level failure.
    NotFound,
    /// `IdentityInconclusive`: no confirmation and at least one host ended
    /// on a temporary condition.
    Inconclusive,
    /// No confirmation and every recorded failure was fatal.
    CommunicationFailure,
}

impl IdentityStatus {
    pub fn is_unresolved(self) -> bool {
        matches!(self, Self::Inconclusive | Self::CommunicationFailure)
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => f.write_str("confirmed"),
            Self::NotFound => f.write_str("not found"),
            Self::Inconclusive => f.write_str("inconclusive"),
            Self::CommunicationFailure => f.write_str("communication failure"),
        }
    }
}

/// Result of trying one candidate set against the domain's hosts in order.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverOutcome {
    pub status: IdentityStatus,
    pub confirmed: Vec<CandidateAddress>,
    pub ledger: HostLedger,
    pub attempts: Vec<HostAttempt>,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReport {
    pub identity: Identity,
    pub outcome: FailoverOutcome,
}

/// Aggregated result of a completed run.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub domain: String,
    pub hosts: Vec<IpAddr>,
    /// Sorted content of the result set at the end of the run.
    pub confirmed: Vec<String>,
    /// Host failures of a catch-all check that got no clear answer.
    pub catch_all_ledger: Option<HostLedger>,
    /// One report per identity, in input order.
    pub identities: Vec<IdentityReport>,
}

impl BatchReport {
    /// Identities that ended inconclusive or on a communication failure.
    pub fn unresolved(&self) -> impl Iterator<Item = &IdentityReport> {
        self.identities
            .iter()
            .filter(|report| report.outcome.status.is_unresolved())
    }
}
