use std::collections::HashSet;
use std::net::IpAddr;

use native_tls::TlsConnector;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::error::SessionError;
use super::options::ProbeConfig;
use super::transport::{Dialer, SmtpStream};
use super::types::{
    AttemptStage, CandidateAddress, FailureKind, HostAttempt, HostFailure, SmtpEvent, SmtpReply,
    Verdict,
};

/// What every session of a run shares.
#[derive(Clone, Copy)]
pub(crate) struct SessionContext<'a> {
    pub config: &'a ProbeConfig,
    /// ASCII form of the target domain.
    pub domain: &'a str,
    pub dialer: &'a dyn Dialer,
    /// `None` when STARTTLS is disabled or unsupported locally.
    pub tls: Option<&'a TlsConnector>,
}

/// Runs one transaction against `host` for a full candidate set.
///
/// Never fails: every abort is folded into the returned attempt, and the
/// connection is released before returning.
pub(crate) fn probe_host(
    host: IpAddr,
    candidates: &[CandidateAddress],
    ctx: SessionContext<'_>,
    enrich: bool,
) -> HostAttempt {
    let mut attempt = HostAttempt::new(host);
    debug!(host = %host, candidates = candidates.len(), "connecting");

    let connection = match ctx.dialer.dial(host, ctx.config.port, ctx.config.timeout()) {
        Ok(connection) => connection,
        Err(err) => {
            warn!(host = %host, error = %err, "mail host unreachable");
            attempt.events.push(SmtpEvent::Error {
                stage: AttemptStage::Connect,
                message: err.to_string(),
            });
            attempt.failure = Some(HostFailure::disconnected(
                AttemptStage::Connect.command_name(),
                err.to_string(),
            ));
            return attempt;
        }
    };

    let mut session = Session {
        host,
        stream: SmtpStream::new(connection),
        attempt,
        pipelining: false,
        requested: HashSet::new(),
    };
    match session.transact(candidates, ctx) {
        Ok(()) if enrich && !session.attempt.confirmed.is_empty() => session.enrich(),
        Ok(()) => {}
        Err(err) => session.abort(err),
    }
    session.close();
    session.attempt.encrypted = session.stream.is_encrypted();
    session.attempt
}

pub(super) struct Session {
    pub(super) host: IpAddr,
    pub(super) stream: SmtpStream,
    pub(super) attempt: HostAttempt,
    pipelining: bool,
    /// Addresses already asked about in this transaction.
    requested: HashSet<String>,
}

impl Session {
    fn transact(
        &mut self,
        candidates: &[CandidateAddress],
        ctx: SessionContext<'_>,
    ) -> Result<(), SessionError> {
        let greeting = self.receive(AttemptStage::Greeting)?;
        if !greeting.is_positive_completion() {
            return Err(SessionError::Reply {
                stage: AttemptStage::Greeting,
                reply: greeting,
            });
        }

        let helo = ctx.config.helo_domain(ctx.domain);
        let mut capabilities = self.hello(&helo)?;

        if let Some(connector) = ctx.tls.filter(|_| !ctx.config.skip_tls) {
            if capabilities.as_ref().is_some_and(|ehlo| ehlo.has_extension("STARTTLS")) {
                let reply = self.command(AttemptStage::StartTls, "STARTTLS")?;
                if reply.is_positive_completion() {
                    self.stream.upgrade_tls(connector, &self.host.to_string())?;
                    debug!(host = %self.host, "TLS established");
                    capabilities = self.hello(&helo)?;
                } else {
                    debug!(host = %self.host, reply = %reply, "STARTTLS declined, staying in clear");
                }
            }
        }
        self.pipelining = capabilities
            .as_ref()
            .is_some_and(|ehlo| ehlo.has_extension("PIPELINING"));

        let sender = ctx.config.envelope_sender(ctx.domain);
        let reply = self.command(AttemptStage::MailFrom, &format!("MAIL FROM:<{sender}>"))?;
        if !reply.is_positive_completion() {
            return Err(SessionError::Reply {
                stage: AttemptStage::MailFrom,
                reply,
            });
        }

        let fresh = self.unrequested(candidates.iter().cloned());
        self.request_recipients(&fresh, AttemptStage::RcptTo)
    }

    /// EHLO, falling back to HELO. Returns the EHLO reply when it was
    /// accepted, `None` after a HELO (no extensions).
    fn hello(&mut self, name: &str) -> Result<Option<SmtpReply>, SessionError> {
        let ehlo = self.command(AttemptStage::Ehlo, &format!("EHLO {name}"))?;
        if ehlo.is_positive_completion() {
            return Ok(Some(ehlo));
        }
        let helo = self.command(AttemptStage::Helo, &format!("HELO {name}"))?;
        if helo.is_positive_completion() {
            Ok(None)
        } else {
            Err(SessionError::Reply {
                stage: AttemptStage::Helo,
                reply: helo,
            })
        }
    }

    /// Asks about every address in `batch` within the open transaction.
    /// Confirmations are kept as they arrive, so a connection lost midway
    /// still leaves the earlier ones in the attempt.
    pub(super) fn request_recipients(
        &mut self,
        batch: &[CandidateAddress],
        stage: AttemptStage,
    ) -> Result<(), SessionError> {
        if self.pipelining && batch.len() > 1 {
            let commands: Vec<String> = batch.iter().map(rcpt_command).collect();
            for command in &commands {
                self.attempt.events.push(SmtpEvent::Sent {
                    stage,
                    command: command.clone(),
                });
            }
            debug!(host = %self.host, count = commands.len(), "pipelining RCPT batch");
            self.stream
                .send_lines(&commands)
                .map_err(SessionError::io(stage))?;
            for candidate in batch {
                let reply = self.receive(stage)?;
                self.record_verdict(candidate, &reply, stage);
            }
        } else {
            for candidate in batch {
                let reply = self.command(stage, &rcpt_command(candidate))?;
                self.record_verdict(candidate, &reply, stage);
            }
        }
        Ok(())
    }

    fn record_verdict(&mut self, candidate: &CandidateAddress, reply: &SmtpReply, stage: AttemptStage) {
        match classify(reply) {
            Verdict::Confirmed => {
                info!(host = %self.host, address = %candidate, code = reply.code, "recipient confirmed");
                self.attempt.confirmed.push(candidate.clone());
            }
            Verdict::Temporary { code, text } => {
                debug!(host = %self.host, address = %candidate, code, "recipient temporarily refused");
                if stage == AttemptStage::RcptTo {
                    self.attempt.last_temporary = Some(HostFailure::new(
                        FailureKind::Temporary,
                        stage.command_name(),
                        Some(code),
                        text,
                    ));
                }
            }
            Verdict::ProtocolFatal { code, .. } => {
                debug!(host = %self.host, address = %candidate, code, "recipient refused");
            }
            Verdict::Rejected => {
                debug!(host = %self.host, address = %candidate, code = reply.code, "recipient not accepted");
            }
        }
    }

    /// Keeps the candidates not yet asked about, in order, and marks them
    /// as asked.
    pub(super) fn unrequested(
        &mut self,
        candidates: impl IntoIterator<Item = CandidateAddress>,
    ) -> Vec<CandidateAddress> {
        candidates
            .into_iter()
            .filter(|candidate| self.requested.insert(candidate.address()))
            .collect()
    }

    fn command(&mut self, stage: AttemptStage, line: &str) -> Result<SmtpReply, SessionError> {
        self.attempt.events.push(SmtpEvent::Sent {
            stage,
            command: line.to_string(),
        });
        debug!(host = %self.host, command = line, "sending");
        self.stream.send_line(line).map_err(SessionError::io(stage))?;
        self.receive(stage)
    }

    fn receive(&mut self, stage: AttemptStage) -> Result<SmtpReply, SessionError> {
        let reply = self.stream.read_reply().map_err(SessionError::io(stage))?;
        debug!(host = %self.host, reply = %reply, "received");
        self.attempt.events.push(SmtpEvent::Received {
            stage,
            reply: reply.clone(),
        });
        Ok(reply)
    }

    pub(super) fn record_error(&mut self, stage: AttemptStage, message: String) {
        self.attempt.events.push(SmtpEvent::Error { stage, message });
    }

    fn abort(&mut self, err: SessionError) {
        let stage = err.stage();
        if matches!(err, SessionError::Io { .. }) {
            self.stream.shutdown();
        }
        warn!(host = %self.host, error = %err, "session aborted");
        self.record_error(stage, err.to_string());
        self.attempt.failure = Some(err.into_failure());
    }

    /// Ends the session. A peer that already hung up counts as closed.
    fn close(&mut self) {
        if !self.stream.is_closed() {
            self.attempt.events.push(SmtpEvent::Sent {
                stage: AttemptStage::Quit,
                command: "QUIT".to_string(),
            });
            let quit = self
                .stream
                .send_line("QUIT")
                .and_then(|()| self.stream.read_reply());
            match quit {
                Ok(reply) => self.attempt.events.push(SmtpEvent::Received {
                    stage: AttemptStage::Quit,
                    reply,
                }),
                Err(err) => debug!(host = %self.host, error = %err, "peer gone before QUIT reply"),
            }
        }
        self.stream.shutdown();
    }
}

fn rcpt_command(candidate: &CandidateAddress) -> String {
    format!("RCPT TO:<{}>", candidate.address())
}
