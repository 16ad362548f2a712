//! SSRF guard: syntactic rejection of unsafe probe targets.
//!
//! Checks are string/literal level only. No DNS resolution happens here,
//! so a hostile record can still rebind a validated hostname at connect
//! time; that gap is deliberate and documented, not silently patched.

use std::net::{Ipv4Addr, Ipv6Addr};
use url::Url;

/// Outcome of validating a candidate endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid { reason: String },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Verdict::Invalid { reason: reason.into() }
    }
}

/// Hostnames and literals that are never probed regardless of range rules:
/// loopback names, unspecified addresses, and cloud metadata services.
const DENY_HOSTS: &[&str] = &[
    "localhost",
    "0.0.0.0",
    "::",
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
    "169.254.169.254",
    "100.100.100.200",
    "fd00:ec2::254",
];

/// Validate a candidate URL. Rules apply in order, first match wins:
/// parse failure, non-https scheme, deny-set hostname, private/reserved
/// IPv4 literal, unsafe IPv6 literal. Anything else passes.
pub fn validate(raw: &str) -> Verdict {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return Verdict::invalid("malformed url"),
    };

    let scheme = parsed.scheme();
    if scheme != "https" {
        return Verdict::invalid(format!("scheme '{}' is not allowed, only https", scheme));
    }

    let host = match parsed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return Verdict::invalid("missing host"),
    };
    // Url keeps brackets around IPv6 literals.
    let bare = host.trim_start_matches('[').trim_end_matches(']');

    if DENY_HOSTS.contains(&bare) {
        return Verdict::invalid(format!("host '{}' is blocked", bare));
    }

    if let Ok(v4) = bare.parse::<Ipv4Addr>() {
        if let Some(reason) = ipv4_block_reason(v4) {
            return Verdict::invalid(reason);
        }
    }

    if let Ok(v6) = bare.parse::<Ipv6Addr>() {
        if let Some(reason) = ipv6_block_reason(v6) {
            return Verdict::invalid(reason);
        }
    }

    Verdict::Valid
}

fn ipv4_block_reason(ip: Ipv4Addr) -> Option<String> {
    let o = ip.octets();
    let blocked = match o[0] {
        0 => true,                                  // 0.0.0.0/8
        10 => true,                                 // 10.0.0.0/8
        127 => true,                                // 127.0.0.0/8
        172 => (16..=31).contains(&o[1]),           // 172.16.0.0/12
        192 => o[1] == 168,                         // 192.168.0.0/16
        169 => o[1] == 254,                         // 169.254.0.0/16
        _ => false,
    };
    blocked.then(|| format!("ipv4 address {} is in a private or reserved range", ip))
}

fn ipv6_block_reason(ip: Ipv6Addr) -> Option<String> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Some(format!("ipv6 address {} is loopback or unspecified", ip));
    }
    let seg = ip.segments();
    if seg[0] & 0xfe00 == 0xfc00 {
        return Some(format!("ipv6 address {} is unique-local", ip));
    }
    if seg[0] & 0xffc0 == 0xfe80 {
        return Some(format!("ipv6 address {} is link-local", ip));
    }
    // Covers both ::ffff:10.0.0.1 and ::ffff:a00:1 spellings; the parser
    // normalizes them to the same address.
    if let Some(v4) = ip.to_ipv4_mapped() {
        if let Some(reason) = ipv4_block_reason(v4) {
            return Some(format!("ipv4-mapped {}", reason));
        }
    }
    None
}
