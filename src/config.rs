//! Builder configuration for [`crate::server::Server`] (spec.md §6).
//!
//! Grounded in the teacher's inline `parse_host_port` in `server.rs`:
//! that parser is pulled out here and given a proper error path instead of
//! `Other(String)`, and gains the `threads < 1 -> 1` normalization spec.md
//! §6 requires, which the teacher's `Server::workers` doesn't enforce at all.

use crate::error::{CoreError, CoreResult};

/// Validated `{port, threads, routes}` builder options (spec.md §6). `routes`
/// itself lives in the [`crate::router::Router`] the caller builds and hands
/// to [`crate::server::Server::serve`]; this type only owns the scalar knobs.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub port: u16,
    pub threads: usize,
}

impl ServerConfig {
    /// `threads < 1` is normalized to 1 (spec.md §6), never rejected.
    pub fn new(port: u16, threads: usize) -> Self {
        Self {
            port,
            threads: threads.max(1),
        }
    }
}

/// Splits a `"host:port"` string the way the teacher's `Server::bind` does,
/// defaulting the host to `0.0.0.0` when omitted.
pub fn parse_host_port(host_port: &str) -> CoreResult<(String, u16)> {
    let mut parts = host_port.splitn(2, ':');
    let host = parts.next().filter(|h| !h.is_empty()).unwrap_or("0.0.0.0");
    let port = parts
        .next()
        .ok_or_else(|| CoreError::Internal("missing port in bind address".to_string()))?
        .parse::<u16>()
        .map_err(|_| CoreError::Internal("invalid port number".to_string()))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_normalizes_to_one() {
        assert_eq!(ServerConfig::new(8080, 0).threads, 1);
    }

    #[test]
    fn positive_threads_pass_through() {
        assert_eq!(ServerConfig::new(8080, 4).threads, 4);
    }

    #[test]
    fn parses_host_and_port() {
        let (host, port) = parse_host_port("127.0.0.1:9000").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
    }

    #[test]
    fn defaults_host_when_omitted() {
        let (host, port) = parse_host_port(":8080").unwrap();
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 8080);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse_host_port("127.0.0.1").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_host_port("127.0.0.1:abc").is_err());
    }
}
