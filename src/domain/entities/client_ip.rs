use std::net::IpAddr;

use actix_web::http::header::HeaderMap;

/// Headers that may carry the real client address, most reliable first.
/// The last two are set by Cloudflare and Akamai respectively.
const IP_HEADER_SOURCES: [&str; 4] = [
    "x-real-ip",
    "x-forwarded-for",
    "cf-connecting-ip",
    "true-client-ip",
];

/// The client address a request came from, as far as it can be trusted.
///
/// Resolution picks the first present header from [`IP_HEADER_SOURCES`]
/// (taking the first entry of a comma-separated list) and requires the
/// candidate to be a well-formed IPv4 or IPv6 address. Anything else is
/// `Unknown` — rate accounting groups those requests under one bucket
/// rather than trusting an unparseable header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIp {
    Resolved(IpAddr),
    Unknown,
}

impl ClientIp {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let candidate = IP_HEADER_SOURCES
            .iter()
            .find_map(|name| headers.get(*name))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim);

        match candidate {
            Some(candidate) => match candidate.parse::<IpAddr>() {
                Ok(address) => ClientIp::Resolved(address),
                Err(_) => ClientIp::Unknown,
            },
            None => ClientIp::Unknown,
        }
    }
}

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientIp::Resolved(address) => address.fmt(f),
            ClientIp::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(name, value) in pairs {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        headers
    }

    #[test]
    fn the_real_ip_header_wins_over_forwarded_for() {
        let headers = headers(&[
            ("x-forwarded-for", "10.0.0.2"),
            ("x-real-ip", "203.0.113.7"),
        ]);
        assert_eq!(
            ClientIp::from_headers(&headers).to_string(),
            "203.0.113.7"
        );
    }

    #[test]
    fn the_first_forwarded_for_entry_is_used() {
        let headers = headers(&[("x-forwarded-for", "198.51.100.1, 10.0.0.1, 172.16.0.3")]);
        assert_eq!(
            ClientIp::from_headers(&headers).to_string(),
            "198.51.100.1"
        );
    }

    #[test]
    fn vendor_headers_are_used_as_fallback() {
        let headers = headers(&[("cf-connecting-ip", "192.0.2.33")]);
        assert_eq!(ClientIp::from_headers(&headers).to_string(), "192.0.2.33");
    }

    #[test]
    fn an_ipv6_address_is_accepted() {
        let headers = headers(&[("x-real-ip", "2001:db8::1")]);
        assert_eq!(ClientIp::from_headers(&headers).to_string(), "2001:db8::1");
    }

    #[test]
    fn a_malformed_candidate_resolves_to_unknown() {
        let headers = headers(&[("x-real-ip", "not-an-address")]);
        assert_eq!(ClientIp::from_headers(&headers), ClientIp::Unknown);
    }

    #[test]
    fn an_out_of_range_ipv4_resolves_to_unknown() {
        let headers = headers(&[("x-real-ip", "999.1.1.1")]);
        assert_eq!(ClientIp::from_headers(&headers), ClientIp::Unknown);
    }

    #[test]
    fn missing_headers_resolve_to_unknown() {
        assert_eq!(ClientIp::from_headers(&HeaderMap::new()), ClientIp::Unknown);
        assert_eq!(ClientIp::Unknown.to_string(), "unknown");
    }
}
