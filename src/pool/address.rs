use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Proxy endpoint. Part of a variant pool's identity: requests routed
/// through different proxies never share connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Proxy URL (e.g. `http://proxy.example:8080`)
    pub url: Url,
}

impl ProxySettings {
    /// Create proxy settings from a URL string.
    pub fn new(url_str: &str) -> Option<Self> {
        let url = Url::parse(url_str).ok()?;
        Some(Self { url })
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }
}

/// Resolved (hostname, port, security, proxy) tuple identifying a variant
/// pool. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub proxy: Option<ProxySettings>,
}

impl HostAddress {
    /// Derive the variant identity for a target URL.
    ///
    /// Returns `None` for URLs without a host or a known default port.
    pub fn from_url(url: &Url, proxy: Option<&ProxySettings>) -> Option<Self> {
        Some(HostAddress {
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
            secure: matches!(url.scheme(), "https" | "wss"),
            proxy: proxy.cloned(),
        })
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.secure {
            write!(f, " (secure)")?;
        }
        if self.proxy.is_some() {
            write!(f, " (proxied)")?;
        }
        Ok(())
    }
}
