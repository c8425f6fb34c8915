//! Request metadata helpers shared by the handlers and the rate limiter.

use axum::http::{header::USER_AGENT, HeaderMap};
use std::{net::IpAddr, str::FromStr};

use crate::token::ClientInfo;

/// Peers whose `X-Forwarded-For` and `X-Real-IP` headers are believed.
///
/// Requests from any other peer are identified by their socket address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    #[must_use]
    pub const fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    #[must_use]
    pub fn trusts(&self, peer: IpAddr) -> bool {
        self.0.contains(&peer.to_canonical())
    }

    /// Client IP for a request arriving from `peer`.
    ///
    /// Proxy headers are only read when `peer` is trusted; the peer itself
    /// is used when they are absent.
    #[must_use]
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
        let peer = peer?;
        if self.trusts(peer) {
            if let Some(forwarded) = extract_client_ip(headers) {
                return Some(forwarded);
            }
        }
        Some(peer.to_canonical().to_string())
    }
}

impl FromStr for TrustedProxies {
    type Err = std::net::AddrParseError;

    /// Comma separated list of addresses, e.g. `10.0.0.1, ::1`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse::<IpAddr>().map(|ip| ip.to_canonical()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Extract a client IP from common proxy headers.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Client metadata stored alongside a newly issued token pair.
pub fn client_info(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted: &TrustedProxies,
) -> ClientInfo {
    ClientInfo {
        ip: trusted.resolve(headers, peer),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv4Addr;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9));

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extract_client_ip_prefers_first_forwarded_hop() {
        let mut headers = forwarded(" 203.0.113.7 , 10.0.0.1");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = forwarded("  ");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));

        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn untrusted_peer_headers_are_ignored() {
        let trusted = TrustedProxies::default();
        let headers = forwarded("203.0.113.7");
        assert_eq!(
            trusted.resolve(&headers, Some(PEER)).as_deref(),
            Some("198.51.100.9")
        );
        assert_eq!(trusted.resolve(&headers, None), None);
    }

    #[test]
    fn trusted_peer_headers_are_used() -> anyhow::Result<()> {
        let trusted: TrustedProxies = "10.0.0.1, 198.51.100.9".parse()?;
        assert_eq!(
            trusted.resolve(&forwarded("203.0.113.7"), Some(PEER)).as_deref(),
            Some("203.0.113.7")
        );
        // no proxy header, the proxy itself is the client
        assert_eq!(
            trusted.resolve(&HeaderMap::new(), Some(PEER)).as_deref(),
            Some("198.51.100.9")
        );
        Ok(())
    }

    #[test]
    fn trusted_proxies_parse() -> anyhow::Result<()> {
        let trusted: TrustedProxies = " 10.0.0.1 ,, ::1 ".parse()?;
        assert!(trusted.trusts("10.0.0.1".parse()?));
        assert!(trusted.trusts("::1".parse()?));
        // ipv4-mapped peers match their ipv4 entry
        assert!(trusted.trusts("::ffff:10.0.0.1".parse()?));
        assert!(!trusted.trusts("10.0.0.2".parse()?));

        assert_eq!("".parse::<TrustedProxies>()?, TrustedProxies::default());
        assert!("10.0.0.0/8".parse::<TrustedProxies>().is_err());
        Ok(())
    }

    #[test]
    fn client_info_reads_peer_and_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.5.0"));
        let info = client_info(&headers, Some(PEER), &TrustedProxies::default());
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.5.0"));
        assert_eq!(info.ip.as_deref(), Some("198.51.100.9"));

        let info = client_info(&headers, None, &TrustedProxies::default());
        assert_eq!(info.ip, None);
    }
}
