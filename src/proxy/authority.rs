//! Upstream authority derivation.
//!
//! Turns a request target into the `host:port` the proxy dials.

use std::fmt;

/// Port used for plain HTTP targets without an explicit port.
pub const HTTP_DEFAULT_PORT: &str = "80";

/// Port used for CONNECT targets without an explicit port.
pub const TUNNEL_DEFAULT_PORT: &str = "443";

/// Which kind of request the target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Absolute-form target of a forwarded HTTP request.
    Http,
    /// Authority-form target of a CONNECT request.
    Tunnel,
}

impl TargetMode {
    pub fn default_port(&self) -> &'static str {
        match self {
            TargetMode::Http => HTTP_DEFAULT_PORT,
            TargetMode::Tunnel => TUNNEL_DEFAULT_PORT,
        }
    }
}

/// Host and port of the upstream endpoint.
///
/// `host` never carries IPv6 brackets; [`fmt::Display`] adds them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAuthority {
    pub host: String,
    pub port: String,
}

impl TargetAuthority {
    /// Derive the authority from a request target.
    ///
    /// HTTP targets lose an optional `http://` prefix and everything from the
    /// first `/`. CONNECT targets are taken whole.
    pub fn from_target(target: &str, mode: TargetMode) -> Self {
        let candidate = match mode {
            TargetMode::Http => {
                let rest = target.strip_prefix("http://").unwrap_or(target);
                rest.split('/').next().unwrap_or(rest)
            }
            TargetMode::Tunnel => target,
        };
        Self::from_authority(candidate, mode.default_port())
    }

    /// Split a bare authority, applying `default_port` when none is present.
    pub fn from_authority(candidate: &str, default_port: &str) -> Self {
        // Bracketed IPv6 literal, with or without a port.
        if let Some(rest) = candidate.strip_prefix('[') {
            if let Some((host, after)) = rest.split_once(']') {
                let port = after.strip_prefix(':').unwrap_or(default_port);
                return Self::new(host, port);
            }
        }

        match candidate.matches(':').count() {
            0 => Self::new(candidate, default_port),
            1 => {
                let (host, port) = candidate.split_once(':').unwrap_or((candidate, default_port));
                Self::new(host, port)
            }
            // Unbracketed IPv6 literal; it cannot carry a port.
            _ => Self::new(candidate, default_port),
        }
    }

    fn new(host: &str, port: &str) -> Self {
        Self {
            host: host.to_string(),
            port: port.to_string(),
        }
    }

    fn is_ipv6_literal(&self) -> bool {
        self.host.contains(':')
    }
}

impl fmt::Display for TargetAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6_literal() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
