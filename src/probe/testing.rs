//! Scripted mail hosts for protocol tests, reached through an in-memory
//! [`Dialer`].

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::transport::{Connection, Dialer};

#[derive(Debug, Clone)]
enum Response {
    Reply(String),
    ReplyThenHangup(String),
    Hangup,
}

/// How one fake mail host answers. Rules match on a case-insensitive
/// command prefix; rules added later take precedence.
#[derive(Debug, Clone)]
pub(crate) struct HostScript {
    greeting: String,
    rules: Vec<(String, Response)>,
    unreachable: bool,
}

impl HostScript {
    /// Greets, accepts EHLO and MAIL FROM, refuses every recipient (550).
    pub(crate) fn accepting() -> Self {
        Self {
            greeting: "220 mx.test ESMTP ready\r\n".to_string(),
            rules: vec![
                ("EHLO".to_string(), Response::Reply(ehlo_reply(&[]))),
                ("HELO".to_string(), Response::Reply("250 mx.test\r\n".to_string())),
                ("MAIL FROM:".to_string(), Response::Reply("250 2.1.0 OK\r\n".to_string())),
                (
                    "RCPT TO:".to_string(),
                    Response::Reply("550 5.1.1 no such user\r\n".to_string()),
                ),
                ("QUIT".to_string(), Response::Reply("221 2.0.0 bye\r\n".to_string())),
            ],
            unreachable: false,
        }
    }

    /// A host whose connection attempts are refused.
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::accepting()
        }
    }

    pub(crate) fn greeting(mut self, raw: &str) -> Self {
        self.greeting = raw.to_string();
        self
    }

    /// Answers `prefix` with a raw reply (CRLF included).
    pub(crate) fn reply(mut self, prefix: &str, raw: &str) -> Self {
        self.rules.insert(0, (prefix.to_string(), Response::Reply(raw.to_string())));
        self
    }

    pub(crate) fn rcpt(self, address: &str, code: u16) -> Self {
        self.reply(&format!("RCPT TO:<{address}>"), &format!("{code} scripted\r\n"))
    }

    /// Reply to recipients without a rule of their own.
    pub(crate) fn rcpt_default(mut self, code: u16) -> Self {
        let raw = format!("{code} scripted\r\n");
        match self.rules.iter_mut().find(|(prefix, _)| prefix == "RCPT TO:") {
            Some(rule) => rule.1 = Response::Reply(raw),
            None => self.rules.push(("RCPT TO:".to_string(), Response::Reply(raw))),
        }
        self
    }

    /// EHLO reply advertising `extensions`.
    pub(crate) fn extensions(self, extensions: &[&str]) -> Self {
        self.reply("EHLO", &ehlo_reply(extensions))
    }

    /// Drops the connection without answering `prefix`.
    pub(crate) fn hangup_on(mut self, prefix: &str) -> Self {
        self.rules.insert(0, (prefix.to_string(), Response::Hangup));
        self
    }

    /// Answers `prefix`, then drops the connection.
    pub(crate) fn reply_then_hangup(mut self, prefix: &str, raw: &str) -> Self {
        self.rules
            .insert(0, (prefix.to_string(), Response::ReplyThenHangup(raw.to_string())));
        self
    }

    fn respond(&self, command: &str) -> Response {
        let upper = command.to_ascii_uppercase();
        self.rules
            .iter()
            .find(|(prefix, _)| upper.starts_with(&prefix.to_ascii_uppercase()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Response::Reply("500 5.5.1 unrecognized command\r\n".to_string()))
    }
}

fn ehlo_reply(extensions: &[&str]) -> String {
    let mut lines = vec!["mx.test".to_string()];
    lines.extend(extensions.iter().map(|ext| ext.to_string()));
    lines.push("SIZE 1000".to_string());
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("250{}{line}\r\n", if i == last { ' ' } else { '-' }))
        .collect()
}

#[derive(Debug, Default)]
struct DialerState {
    scripts: HashMap<IpAddr, HostScript>,
    dials: Vec<IpAddr>,
    commands: Vec<(IpAddr, String)>,
}

/// In-memory dialer. Clones share state, so a test keeps one handle to
/// inspect traffic after handing another to the prober.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedDialer {
    state: Arc<Mutex<DialerState>>,
}

impl ScriptedDialer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn host(self, addr: &str, script: HostScript) -> Self {
        let addr: IpAddr = addr.parse().expect("test address");
        self.state.lock().scripts.insert(addr, script);
        self
    }

    /// Every connection attempt, in order.
    pub(crate) fn dials(&self) -> Vec<IpAddr> {
        self.state.lock().dials.clone()
    }

    /// Every command received, in order, with the host it was sent to.
    pub(crate) fn commands(&self) -> Vec<(IpAddr, String)> {
        self.state.lock().commands.clone()
    }

    pub(crate) fn commands_to(&self, addr: &str) -> Vec<String> {
        let addr: IpAddr = addr.parse().expect("test address");
        self.commands()
            .into_iter()
            .filter(|(host, _)| *host == addr)
            .map(|(_, command)| command)
            .collect()
    }
}

impl Dialer for ScriptedDialer {
    fn dial(
        &self,
        host: IpAddr,
        _port: u16,
        _timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        state.dials.push(host);
        let script = match state.scripts.get(&host) {
            Some(script) if !script.unreachable => script.clone(),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("{host}: connection refused"),
                ));
            }
        };
        Ok(Box::new(ScriptedConnection {
            host,
            output: script.greeting.bytes().collect(),
            script,
            pending: Vec::new(),
            hung_up: false,
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct ScriptedConnection {
    host: IpAddr,
    script: HostScript,
    pending: Vec<u8>,
    output: VecDeque<u8>,
    hung_up: bool,
    state: Arc<Mutex<DialerState>>,
}

impl ScriptedConnection {
    fn handle(&mut self, command: String) {
        let response = self.script.respond(&command);
        self.state.lock().commands.push((self.host, command));
        match response {
            Response::Reply(raw) => self.output.extend(raw.bytes()),
            Response::ReplyThenHangup(raw) => {
                self.output.extend(raw.bytes());
                self.hung_up = true;
            }
            Response::Hangup => self.hung_up = true,
        }
    }
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.output.read(buf)
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.hung_up {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"));
        }
        self.pending.extend_from_slice(buf);
        while !self.hung_up {
            let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let command = String::from_utf8_lossy(&line).trim_end().to_string();
            self.handle(command);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
