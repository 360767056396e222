//! Peer membership and address parsing.

use crate::error::{LedgerError, Result};
use std::collections::BTreeSet;

/// Deduplicated set of peer `host:port` addresses.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and records `address`, returning the stored form. The registry
    /// is untouched when the address is rejected.
    pub fn register(&mut self, address: &str) -> Result<String> {
        let node = parse_address(address)?;
        self.nodes.insert(node.clone());
        Ok(node)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }
}

/// Accepts `scheme://host[:port][/...]`, keeping the network location, or a
/// bare `host:port`.
pub fn parse_address(address: &str) -> Result<String> {
    let invalid = || LedgerError::InvalidAddress(address.to_owned());
    let trimmed = address.trim();

    let (netloc, port_required) = match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            if !is_scheme(scheme) {
                return Err(invalid());
            }
            let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
            // userinfo is never forwarded to peers
            let host_port = authority
                .rsplit_once('@')
                .map_or(authority, |(_, host_port)| host_port);
            (host_port, false)
        }
        None => (trimmed, true),
    };

    if is_host_port(netloc, port_required) {
        Ok(netloc.to_owned())
    } else {
        Err(invalid())
    }
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_host_port(netloc: &str, port_required: bool) -> bool {
    let (host_ok, port) = if let Some(bracketed) = netloc.strip_prefix('[') {
        let Some((host, rest)) = bracketed.split_once(']') else {
            return false;
        };
        let host_ok = !host.is_empty() && host.chars().all(|c| c.is_ascii_hexdigit() || c == ':');
        match rest {
            "" => (host_ok, None),
            _ => match rest.strip_prefix(':') {
                Some(port) => (host_ok, Some(port)),
                None => return false,
            },
        }
    } else {
        let (host, port) = match netloc.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (netloc, None),
        };
        let host_ok = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        (host_ok, port)
    };

    let port_ok = match port {
        Some(port) => port.bytes().all(|b| b.is_ascii_digit()) && port.parse::<u16>().is_ok(),
        None => !port_required,
    };
    host_ok && port_ok
}
