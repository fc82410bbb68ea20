//! `scheme://host[:port]` address parsing.
//!
//! A hand-rolled parser is used rather than the `url` crate: this grammar
//! is narrower than RFC 3986 (no path/query/fragment, a missing scheme is
//! simply an error rather than treated as a relative reference) and needs
//! a bare numeric-or-zero port rule the `url` crate does not expose
//! directly.

use crate::error::{NetError, NetResult};

/// A parsed `scheme://host[:port]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// The scheme, e.g. `"mem"`, `"tcp"`.
    pub scheme: String,
    /// The host or bracketed IPv6 literal, brackets stripped.
    pub host: String,
    /// The port, or `0` if omitted.
    pub port: u16,
}

/// Parses `scheme://host[:port]`. IPv6 hosts use bracket form
/// `scheme://[::1]:port`. A missing port parses as `0`; a missing scheme
/// (no `://` present) is a parse error.
pub fn parse_address(s: &str) -> NetResult<Address> {
    let (scheme, rest) = s
        .split_once("://")
        .ok_or_else(|| NetError::AddressParse(format!("missing scheme in '{s}'")))?;
    if scheme.is_empty() {
        return Err(NetError::AddressParse(format!("empty scheme in '{s}'")));
    }

    let (host, port) = if let Some(bracket_rest) = rest.strip_prefix('[') {
        let close = bracket_rest
            .find(']')
            .ok_or_else(|| NetError::AddressParse(format!("unterminated IPv6 literal in '{s}'")))?;
        let host = bracket_rest[..close].to_string();
        let after = &bracket_rest[close + 1..];
        let port = parse_port_suffix(after);
        (host, port)
    } else if let Some((host, port_str)) = rest.split_once(':') {
        (host.to_string(), parse_port_str(port_str))
    } else {
        (rest.to_string(), 0)
    };

    if host.is_empty() {
        return Err(NetError::AddressParse(format!("empty host in '{s}'")));
    }

    Ok(Address {
        scheme: scheme.to_string(),
        host,
        port,
    })
}

fn parse_port_suffix(after: &str) -> u16 {
    match after.strip_prefix(':') {
        Some(p) => parse_port_str(p),
        None => 0,
    }
}

fn parse_port_str(p: &str) -> u16 {
    // Out-of-range or non-numeric ports fall back to 0 rather than erroring
    // ports outside the numeric range yield 0 rather than an error.
    p.parse::<u32>()
        .ok()
        .filter(|&n| n <= u16::MAX as u32)
        .map(|n| n as u16)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_port() {
        let addr = parse_address("mem://localhost:7000").unwrap();
        assert_eq!(addr.scheme, "mem");
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 7000);
    }

    #[test]
    fn missing_port_defaults_to_zero() {
        let addr = parse_address("loop://localhost").unwrap();
        assert_eq!(addr.port, 0);
    }

    #[test]
    fn missing_scheme_is_an_error() {
        let err = parse_address("localhost:7000").unwrap_err();
        assert_eq!(err.code(), "ENOROUTE");
    }

    #[test]
    fn ipv6_bracket_form() {
        let addr = parse_address("tcp://[::1]:8080").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn out_of_range_port_yields_zero() {
        let addr = parse_address("mem://host:999999").unwrap();
        assert_eq!(addr.port, 0);
    }
}
