//! Capability tags and the `requireCap` gate.

use crate::error::{CoreError, CoreResult};
use std::collections::HashSet;
use std::fmt;

/// A single capability tag from the closed set of grantable tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Cap {
    /// Network access.
    Net,
    /// Filesystem access.
    Fs,
    /// Access to the kernel clock.
    Clock,
    /// Access to the kernel RNG.
    Rng,
    /// Inter-process (message-port) communication.
    Ipc,
    /// stdin/stdout/stderr access.
    Stdio,
    /// Tracer/event-stream access.
    Trace,
    /// Fault-injection configuration access.
    Chaos,
    /// Environment variable access.
    Env,
    /// Signal delivery access.
    Signal,
    /// `tcp:connect`
    TcpConnect,
    /// `tcp:listen`
    TcpListen,
    /// `udp:send`
    UdpSend,
    /// `udp:bind`
    UdpBind,
    /// `dns:resolve`
    DnsResolve,
    /// `loopback`
    Loopback,
    /// Wildcard: satisfies every check.
    All,
}

impl Cap {
    /// The exact string token for this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cap::Net => "net",
            Cap::Fs => "fs",
            Cap::Clock => "clock",
            Cap::Rng => "rng",
            Cap::Ipc => "ipc",
            Cap::Stdio => "stdio",
            Cap::Trace => "trace",
            Cap::Chaos => "chaos",
            Cap::Env => "env",
            Cap::Signal => "signal",
            Cap::TcpConnect => "tcp:connect",
            Cap::TcpListen => "tcp:listen",
            Cap::UdpSend => "udp:send",
            Cap::UdpBind => "udp:bind",
            Cap::DnsResolve => "dns:resolve",
            Cap::Loopback => "loopback",
            Cap::All => "*",
        }
    }

    /// Parses a capability tag from its string token.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "net" => Cap::Net,
            "fs" => Cap::Fs,
            "clock" => Cap::Clock,
            "rng" => Cap::Rng,
            "ipc" => Cap::Ipc,
            "stdio" => Cap::Stdio,
            "trace" => Cap::Trace,
            "chaos" => Cap::Chaos,
            "env" => Cap::Env,
            "signal" => Cap::Signal,
            "tcp:connect" => Cap::TcpConnect,
            "tcp:listen" => Cap::TcpListen,
            "udp:send" => Cap::UdpSend,
            "udp:bind" => Cap::UdpBind,
            "dns:resolve" => Cap::DnsResolve,
            "loopback" => Cap::Loopback,
            "*" => Cap::All,
            _ => return None,
        })
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable set of granted capability tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    granted: HashSet<Cap>,
}

impl CapabilitySet {
    /// Builds a capability set from an iterator of tags.
    pub fn new(tags: impl IntoIterator<Item = Cap>) -> Self {
        Self {
            granted: tags.into_iter().collect(),
        }
    }

    /// Parses a capability set from string tokens, skipping unknown tokens.
    pub fn parse_all<'a>(tags: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(tags.into_iter().filter_map(Cap::parse))
    }

    /// `true` if `cap` is granted, or `ALL` is granted.
    pub fn has(&self, cap: Cap) -> bool {
        self.granted.contains(&Cap::All) || self.granted.contains(&cap)
    }

    /// The raw granted set (does not expand `ALL`).
    pub fn granted(&self) -> &HashSet<Cap> {
        &self.granted
    }
}

/// Fails with `ECAPDENIED` unless `cap` is granted (directly, or via `ALL`).
pub fn require_cap(caps: &CapabilitySet, cap: Cap) -> CoreResult<()> {
    if caps.has(cap) {
        Ok(())
    } else {
        Err(CoreError::CapDenied(cap.as_str().to_string()))
    }
}
