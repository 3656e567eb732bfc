use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use super::error::SessionError;
use super::options::{ProbeConfig, ProxyConfig};
use super::types::SmtpReply;

/// Byte stream a session speaks SMTP over.
pub trait Connection: Read + Write + Send + fmt::Debug {}

impl<T: Read + Write + Send + fmt::Debug> Connection for T {}

/// Opens connections to mail hosts. Implementations decide how the socket
/// is reached (directly, through a proxy); sessions only see the stream.
pub trait Dialer: Send + Sync {
    fn dial(
        &self,
        host: IpAddr,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>>;
}

/// Plain TCP connection with connect, read and write deadlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl Dialer for DirectDialer {
    fn dial(
        &self,
        host: IpAddr,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>> {
        let stream = connect_tcp(&SocketAddr::new(host, port), timeout)?;
        Ok(Box::new(stream))
    }
}

/// Tunnels every connection through a SOCKS5 proxy (RFC 1928), with
/// optional username/password authentication (RFC 1929).
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy: ProxyConfig,
}

impl Socks5Dialer {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self { proxy }
    }
}

impl Dialer for Socks5Dialer {
    fn dial(
        &self,
        host: IpAddr,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Connection>> {
        let proxy_addr = (self.proxy.host.as_str(), self.proxy.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("proxy {} did not resolve", self.proxy.host),
                )
            })?;
        let mut stream = connect_tcp(&proxy_addr, timeout)?;
        socks5_connect(&mut stream, &self.proxy, SocketAddr::new(host, port))?;
        Ok(Box::new(stream))
    }
}

/// Picks the dialer matching the proxy settings of `config`.
pub fn dialer_for(config: &ProbeConfig) -> Box<dyn Dialer> {
    match &config.proxy {
        Some(proxy) => Box::new(Socks5Dialer::new(proxy.clone())),
        None => Box::new(DirectDialer),
    }
}

fn connect_tcp(addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let stream = match timeout {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(stream)
}

const SOCKS_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_USER_PASS: u8 = 0x02;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn socks5_connect<S: Read + Write>(
    stream: &mut S,
    proxy: &ProxyConfig,
    target: SocketAddr,
) -> io::Result<()> {
    let credentials = proxy.credentials();
    let methods: &[u8] = if credentials.is_some() {
        &[AUTH_NONE, AUTH_USER_PASS]
    } else {
        &[AUTH_NONE]
    };
    let mut hello = vec![SOCKS_VERSION, methods.len() as u8];
    hello.extend_from_slice(methods);
    stream.write_all(&hello)?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice)?;
    if choice[0] != SOCKS_VERSION {
        return Err(proxy_error(format!(
            "unexpected SOCKS version {}",
            choice[0]
        )));
    }
    match (choice[1], credentials) {
        (AUTH_NONE, _) => {}
        (AUTH_USER_PASS, Some((user, pass))) => socks5_authenticate(stream, user, pass)?,
        _ => return Err(proxy_error("no acceptable authentication method")),
    }

    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
    match target.ip() {
        IpAddr::V4(ip) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
    }
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request)?;
    stream.flush()?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head)?;
    if head[1] != 0x00 {
        return Err(proxy_error(format!(
            "CONNECT to {target} refused: {}",
            socks5_reply_text(head[1])
        )));
    }
    let bound_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len)?;
            usize::from(len[0])
        }
        other => return Err(proxy_error(format!("unknown address type {other}"))),
    };
    let mut bound = vec![0u8; bound_len + 2];
    stream.read_exact(&mut bound)?;
    Ok(())
}

fn socks5_authenticate<S: Read + Write>(stream: &mut S, user: &str, pass: &str) -> io::Result<()> {
    let (user, pass) = (user.as_bytes(), pass.as_bytes());
    if user.len() > 255 || pass.len() > 255 {
        return Err(proxy_error("proxy credentials longer than 255 bytes"));
    }
    let mut request = vec![0x01, user.len() as u8];
    request.extend_from_slice(user);
    request.push(pass.len() as u8);
    request.extend_from_slice(pass);
    stream.write_all(&request)?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status)?;
    if status[1] != 0x00 {
        return Err(proxy_error("proxy authentication rejected"));
    }
    Ok(())
}

fn socks5_reply_text(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

fn proxy_error(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, message.into())
}

/// Connector used for STARTTLS. Mail hosts are reached by IP address, so
/// certificates and hostnames are not verified. `None` when the platform TLS
/// backend is unavailable; sessions then stay unencrypted.
pub(crate) fn tls_connector() -> Option<TlsConnector> {
    match TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .use_sni(false)
        .build()
    {
        Ok(connector) => Some(connector),
        Err(err) => {
            tracing::warn!(error = %err, "TLS unavailable, probing without STARTTLS");
            None
        }
    }
}

/// Longest reply line accepted before the peer is considered broken.
const MAX_LINE_LEN: usize = 4096;

#[derive(Debug)]
enum StreamState {
    Plain(Box<dyn Connection>),
    Tls(TlsStream<Box<dyn Connection>>),
    Closed,
}

/// Line-oriented SMTP stream that can be upgraded to TLS in place.
#[derive(Debug)]
pub(crate) struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

impl SmtpStream {
    pub(crate) fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            state: StreamState::Plain(connection),
            buffer: Vec::new(),
        }
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        matches!(self.state, StreamState::Tls(_))
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.state, StreamState::Closed)
    }

    /// Negotiates TLS over the current connection. On failure the
    /// connection is gone and the stream is closed.
    pub(crate) fn upgrade_tls(
        &mut self,
        connector: &TlsConnector,
        domain: &str,
    ) -> Result<(), SessionError> {
        let plain = match std::mem::replace(&mut self.state, StreamState::Closed) {
            StreamState::Plain(connection) => connection,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Closed => {
                return Err(SessionError::Tls {
                    message: "connection already closed".to_string(),
                });
            }
        };
        self.buffer.clear();

        match connector.connect(domain, plain) {
            Ok(tls) => {
                self.state = StreamState::Tls(tls);
                Ok(())
            }
            Err(HandshakeError::Failure(err)) => Err(SessionError::Tls {
                message: err.to_string(),
            }),
            // Sockets are blocking, so this only surfaces when the read
            // deadline elapsed mid-handshake.
            Err(HandshakeError::WouldBlock(_)) => Err(SessionError::Tls {
                message: "handshake timed out".to_string(),
            }),
        }
    }

    pub(crate) fn send_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)
    }

    /// Writes several command lines in a single flush (pipelining).
    pub(crate) fn send_lines(&mut self, lines: &[String]) -> io::Result<()> {
        let mut data = Vec::new();
        for line in lines {
            data.extend_from_slice(line.as_bytes());
            data.extend_from_slice(b"\r\n");
        }
        self.write_all(&data)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            StreamState::Tls(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            StreamState::Closed => Err(not_connected()),
        }
    }

    pub(crate) fn read_reply(&mut self) -> io::Result<SmtpReply> {
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let (parsed_code, last, text) = parse_reply_line(&line)?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("inconsistent SMTP reply codes: {existing} vs {parsed_code}"),
                    ));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            lines.push(text);
            if last {
                break;
            }
        }
        let code = code.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "SMTP reply missing status code")
        })?;
        Ok(SmtpReply::new(code, lines.join("\n")))
    }

    fn read_line(&mut self) -> io::Result<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.ends_with(b"\r") {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_LINE_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "SMTP reply line too long",
                ));
            }

            let mut chunk = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut chunk)?,
                StreamState::Tls(stream) => stream.read(&mut chunk)?,
                StreamState::Closed => return Err(not_connected()),
            };
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading reply",
                ));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drops the connection. Further I/O reports `NotConnected`.
    pub(crate) fn shutdown(&mut self) {
        self.state = StreamState::Closed;
        self.buffer.clear();
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection already closed")
}

/// Splits one reply line into code, "is last line" and text.
fn parse_reply_line(line: &str) -> io::Result<(u16, bool, String)> {
    let code_part = line.get(..3).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid SMTP reply: '{line}'"),
        )
    })?;
    if !code_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid SMTP status code: '{code_part}'"),
        ));
    }
    let code = code_part.parse::<u16>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid SMTP status code: '{code_part}'"),
        )
    })?;
    let last = line.as_bytes().get(3).copied() != Some(b'-');
    let text = line.get(4..).unwrap_or_default().to_string();
    Ok((code, last, text))
}
