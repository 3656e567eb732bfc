use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailprobe::{ProbeConfig, ProxyConfig};

/// Finds which name-derived addresses a domain's mail hosts accept.
#[derive(Parser, Debug)]
#[command(name = "mailprobe-cli", version)]
pub struct Cli {
    /// domain whose mailboxes are probed
    pub domain: String,

    /// `first,last` file, one person per line
    #[arg(long, short = 'i', conflicts_with = "stdin")]
    pub input: Option<PathBuf>,

    /// read `first,last` lines from stdin
    #[arg(long)]
    pub stdin: bool,

    /// envelope sender for MAIL FROM (default postmaster@<domain>)
    #[arg(long = "from", env = "MAILPROBE_FROM")]
    pub sender: Option<String>,

    /// name announced in EHLO/HELO (default <domain>)
    #[arg(long)]
    pub helo: Option<String>,

    /// SMTP port
    #[arg(long, default_value_t = 25)]
    pub port: u16,

    /// per connect / per request timeout in ms, 0 disables it
    #[arg(long = "timeout", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// never attempt STARTTLS
    #[arg(long = "no-tls")]
    pub no_tls: bool,

    /// SOCKS5 proxy as host:port
    #[arg(long, env = "MAILPROBE_PROXY")]
    pub proxy: Option<String>,

    #[arg(long = "proxy-user", env = "MAILPROBE_PROXY_USER", requires = "proxy")]
    pub proxy_user: Option<String>,

    #[arg(long = "proxy-pass", env = "MAILPROBE_PROXY_PASS", requires = "proxy")]
    pub proxy_pass: Option<String>,

    /// identities probed at the same time
    #[arg(long, default_value_t = 16)]
    pub concurrency: usize,

    /// probe IPv6 mail hosts too
    #[arg(long)]
    pub ipv6: bool,

    /// format: human|json|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// write report to file (atomically)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn probe_config(&self) -> Result<ProbeConfig> {
        let mut config = ProbeConfig::new(self.domain.trim());
        config.sender = self.sender.clone();
        config.helo_domain = self.helo.clone();
        config.port = self.port;
        config.timeout = Duration::from_millis(self.timeout_ms);
        config.skip_tls = self.no_tls;
        config.max_concurrency = self.concurrency;
        config.ipv6 = self.ipv6;
        config.proxy = match &self.proxy {
            Some(addr) => {
                let mut proxy = parse_proxy(addr)?;
                proxy.username = self.proxy_user.clone();
                proxy.password = self.proxy_pass.clone();
                Some(proxy)
            }
            None => None,
        };
        Ok(config)
    }
}

pub fn parse_proxy(spec: &str) -> Result<ProxyConfig> {
    let spec = spec.trim().trim_start_matches("socks5://");
    let Some((host, port)) = spec.rsplit_once(':') else {
        bail!("--proxy expects host:port, got '{spec}'");
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        bail!("--proxy host is empty");
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid --proxy port '{port}'"))?;
    Ok(ProxyConfig::new(host, port))
}
