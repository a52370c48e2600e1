//! Electrum server endpoints

use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Electrum endpoint, parsed from `tcp://host:port` or `ssl://host:port`
///
/// A bare `host:port` is read as plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectrumUrl {
    /// TLS endpoint; the flag says whether the server certificate's domain is checked
    Tls(String, bool),
    /// Plaintext TCP endpoint
    Plaintext(String),
}

/// Errors from parsing an `ElectrumUrl`
#[derive(Debug, Error)]
pub enum UrlError {
    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme `{0}`, expected `tcp` or `ssl`")]
    Scheme(String),

    #[error("port is missing")]
    MissingPort,

    #[error("host is missing")]
    MissingHost,

    #[error("`ssl` needs a domain name, not an IP address")]
    SslWithoutDomain,

    #[error("cannot validate the domain without TLS")]
    ValidateWithoutTls,

    #[error("pass host:port without a scheme")]
    UnexpectedScheme,
}

impl ElectrumUrl {
    /// Build from `host_port` (no scheme)
    pub fn new(host_port: &str, tls: bool, validate_domain: bool) -> Result<Self, UrlError> {
        if host_port.contains("://") {
            return Err(UrlError::UnexpectedScheme);
        }

        match (tls, validate_domain) {
            (true, validate) => Ok(ElectrumUrl::Tls(host_port.to_string(), validate)),
            (false, true) => Err(UrlError::ValidateWithoutTls),
            (false, false) => Ok(ElectrumUrl::Plaintext(host_port.to_string())),
        }
    }

    /// Plaintext endpoint from a trusted `host:port`
    pub fn plaintext(host_port: &str) -> Self {
        ElectrumUrl::Plaintext(host_port.to_string())
    }

    pub fn host_port(&self) -> &str {
        match self {
            ElectrumUrl::Tls(host_port, _) | ElectrumUrl::Plaintext(host_port) => host_port,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ElectrumUrl::Tls(..))
    }

    pub fn validate_domain(&self) -> bool {
        matches!(self, ElectrumUrl::Tls(_, true))
    }
}

impl FromStr for ElectrumUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let with_scheme = if s.contains("://") {
            s.to_string()
        } else {
            format!("tcp://{}", s)
        };

        let url: url::Url = with_scheme.parse()?;
        let tls = match url.scheme() {
            "ssl" | "tls" => true,
            "tcp" => false,
            other => return Err(UrlError::Scheme(other.to_string())),
        };
        let port = url.port().ok_or(UrlError::MissingPort)?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or(UrlError::MissingHost)?;

        // Certificates name domains, so TLS to a bare IP cannot be validated
        if tls && host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().is_ok() {
            return Err(UrlError::SslWithoutDomain);
        }

        ElectrumUrl::new(&format!("{}:{}", host, port), tls, tls)
    }
}

impl std::fmt::Display for ElectrumUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectrumUrl::Tls(host_port, _) => write!(f, "ssl://{}", host_port),
            ElectrumUrl::Plaintext(host_port) => write!(f, "tcp://{}", host_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plaintext() {
        let plain: ElectrumUrl = "electrum.example.org:50001".parse().unwrap();
        assert_eq!(plain, ElectrumUrl::plaintext("electrum.example.org:50001"));
        assert_eq!(plain.to_string(), "tcp://electrum.example.org:50001");

        let prefixed: ElectrumUrl = "tcp://127.0.0.1:60401".parse().unwrap();
        assert_eq!(prefixed.host_port(), "127.0.0.1:60401");
        assert!(!prefixed.is_tls());
    }

    #[test]
    fn test_parse_tls() {
        let url: ElectrumUrl = "ssl://electrum.blockstream.info:60002".parse().unwrap();
        assert_eq!(
            url,
            ElectrumUrl::Tls("electrum.blockstream.info:60002".to_string(), true)
        );
        assert!(url.validate_domain());
        assert_eq!(url.to_string(), "ssl://electrum.blockstream.info:60002");
    }

    #[test]
    fn test_parse_rejects() {
        assert!(matches!(
            "ssl://127.0.0.1:50002".parse::<ElectrumUrl>(),
            Err(UrlError::SslWithoutDomain)
        ));
        assert!(matches!(
            "http://electrum.example.org:50001".parse::<ElectrumUrl>(),
            Err(UrlError::Scheme(_))
        ));
        assert!(matches!(
            "electrum.example.org".parse::<ElectrumUrl>(),
            Err(UrlError::MissingPort)
        ));
        assert!("host:port".parse::<ElectrumUrl>().is_err());
    }

    #[test]
    fn test_new() {
        assert!(ElectrumUrl::new("tcp://example.org:50001", false, false).is_err());
        assert!(matches!(
            ElectrumUrl::new("example.org:50001", false, true),
            Err(UrlError::ValidateWithoutTls)
        ));
        let unchecked = ElectrumUrl::new("example.org:50002", true, false).unwrap();
        assert!(unchecked.is_tls());
        assert!(!unchecked.validate_domain());
    }
}
