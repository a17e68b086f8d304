use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AppError, Result};

/// Outbound proxy a browser process is launched behind.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyDescriptor {
    /// `--proxy-server` value. Credentials are answered separately on auth challenge.
    pub fn server_arg(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Password stays out of logs.
        f.debug_struct("ProxyDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse `[user:pass@]host:port` (an optional `http://` prefix is accepted).
pub fn parse_proxy(raw: &str) -> Result<ProxyDescriptor> {
    let bad = || AppError::Config(format!("invalid proxy entry: {raw}"));
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);

    let (auth, addr) = match rest.rsplit_once('@') {
        Some((auth, addr)) => (Some(auth), addr),
        None => (None, rest),
    };

    let (host, port) = addr.rsplit_once(':').ok_or_else(bad)?;
    if host.is_empty() {
        return Err(bad());
    }
    let port = port.parse::<u16>().map_err(|_| bad())?;

    let (username, password) = match auth {
        Some(auth) => {
            let (u, p) = auth.split_once(':').ok_or_else(bad)?;
            (Some(u.to_string()), Some(p.to_string()))
        }
        None => (None, None),
    };

    Ok(ProxyDescriptor {
        host: host.to_string(),
        port,
        username,
        password,
    })
}

/// Comma-separated list; blank entries are skipped.
pub fn parse_proxy_list(raw: &str) -> Result<Vec<ProxyDescriptor>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_proxy)
        .collect()
}

/// Round-robin assignment of proxies to new browser sessions.
#[derive(Debug)]
pub struct ProxyRotation {
    proxies: Vec<ProxyDescriptor>,
    cursor: AtomicUsize,
}

impl ProxyRotation {
    pub fn new(proxies: Vec<ProxyDescriptor>) -> Self {
        Self {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }

    /// None when the pool is empty.
    pub fn next(&self) -> Option<ProxyDescriptor> {
        if self.proxies.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[i].clone())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_authenticated_entries() {
        let p = parse_proxy("10.0.0.1:8080").unwrap();
        assert_eq!(p.host, "10.0.0.1");
        assert_eq!(p.port, 8080);
        assert!(p.credentials().is_none());

        let p = parse_proxy("http://bob:s3cr:et@proxy.local:3128").unwrap();
        assert_eq!(p.host, "proxy.local");
        assert_eq!(p.port, 3128);
        assert_eq!(p.credentials(), Some(("bob", "s3cr:et")));
        assert_eq!(p.server_arg(), "http://proxy.local:3128");
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_proxy("no-port").is_err());
        assert!(parse_proxy(":8080").is_err());
        assert!(parse_proxy("host:notaport").is_err());
        assert!(parse_proxy("useronly@host:1").is_err());
    }

    #[test]
    fn list_skips_blank_entries() {
        let list = parse_proxy_list(" a:1, ,b:2,").unwrap();
        assert_eq!(list.len(), 2);
        assert!(parse_proxy_list("").unwrap().is_empty());
    }

    #[test]
    fn debug_hides_password() {
        let p = parse_proxy("u:hunter2@h:1").unwrap();
        assert!(!format!("{p:?}").contains("hunter2"));
    }

    #[test]
    fn rotation_is_round_robin() {
        let rotation = ProxyRotation::new(parse_proxy_list("a:1,b:2,c:3").unwrap());
        let hosts: Vec<String> = (0..7).map(|_| rotation.next().unwrap().host).collect();
        assert_eq!(hosts, ["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn empty_rotation_yields_nothing() {
        let rotation = ProxyRotation::new(Vec::new());
        assert!(rotation.is_empty());
        assert!(rotation.next().is_none());
    }
}
