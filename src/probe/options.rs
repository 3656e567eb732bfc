use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// SOCKS5 proxy the SMTP connections are tunnelled through.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Username/password pair, when a username is configured. A missing
    /// password is sent as an empty one.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .filter(|user| !user.is_empty())
            .map(|user| (user, self.password.as_deref().unwrap_or("")))
    }
}

/// Run configuration handed to [`Prober`](crate::probe::Prober).
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Domain whose mailboxes are probed.
    pub domain: String,
    /// Envelope sender for `MAIL FROM`.
    pub sender: Option<String>,
    /// Name announced in `EHLO`/`HELO`.
    pub helo_domain: Option<String>,
    pub port: u16,
    /// Applies to the connection attempt and to every request/response
    /// exchange. Zero disables it.
    pub timeout: Duration,
    /// Never attempt STARTTLS.
    pub skip_tls: bool,
    pub proxy: Option<ProxyConfig>,
    /// Upper bound on identities probed at the same time.
    pub max_concurrency: usize,
    /// Probe IPv6 mail hosts as well.
    pub ipv6: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            sender: None,
            helo_domain: None,
            port: 25,
            timeout: Duration::from_secs(10),
            skip_tls: false,
            proxy: None,
            max_concurrency: 16,
            ipv6: false,
        }
    }
}

impl ProbeConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// The timeout as an `Option`, `None` meaning no deadline.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the hostname used in the `EHLO` command. Defaults to the ASCII
    /// target domain when none is provided.
    pub fn helo_domain<'a>(&'a self, ascii_domain: &'a str) -> Cow<'a, str> {
        self.helo_domain
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(Cow::Borrowed)
            .unwrap_or_else(|| Cow::Borrowed(ascii_domain))
    }

    /// Returns the envelope sender used in the `MAIL FROM` command. When
    /// unspecified a `postmaster@domain` placeholder is synthesised.
    pub fn envelope_sender(&self, ascii_domain: &str) -> String {
        self.sender
            .as_ref()
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("postmaster@{ascii_domain}"))
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fall_back_to_target_domain() {
        let config = ProbeConfig::new("example.com");
        assert_eq!(config.helo_domain("example.com"), "example.com");
        assert_eq!(
            config.envelope_sender("example.com"),
            "postmaster@example.com"
        );
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_timeout_and_concurrency() {
        let config = ProbeConfig {
            timeout: Duration::ZERO,
            max_concurrency: 0,
            ..ProbeConfig::default()
        };
        assert_eq!(config.timeout(), None);
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn proxy_credentials_need_a_username() {
        let mut proxy = ProxyConfig::new("proxy.local", 1080);
        assert_eq!(proxy.credentials(), None);
        proxy.username = Some("probe".to_string());
        assert_eq!(proxy.credentials(), Some(("probe", "")));
    }
}
