//! Built-in blocklists for hostnames and IP addresses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

/// Names that are blocked outright, along with every subdomain beneath them.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localdomain",
    "local",
    "internal",
    "intranet",
    "lan",
    "home.arpa",
    "metadata.goog",
    "metadata.google.internal",
    "metadata.azure.internal",
    "instance-data",
];

/// IPv4 ranges that are never fetched.
const BLOCKED_V4: &[(Ipv4Net, &str)] = &[
    (v4(0, 0, 0, 0, 8), "\"this network\" address (0.0.0.0/8)"),
    (v4(10, 0, 0, 0, 8), "private address (10.0.0.0/8)"),
    (v4(100, 64, 0, 0, 10), "shared address space (100.64.0.0/10)"),
    (v4(127, 0, 0, 0, 8), "loopback address (127.0.0.0/8)"),
    (v4(169, 254, 0, 0, 16), "link-local address (169.254.0.0/16)"),
    (v4(172, 16, 0, 0, 12), "private address (172.16.0.0/12)"),
    (v4(192, 0, 0, 0, 24), "IETF protocol assignment (192.0.0.0/24)"),
    (v4(192, 0, 2, 0, 24), "documentation address (192.0.2.0/24)"),
    (v4(192, 168, 0, 0, 16), "private address (192.168.0.0/16)"),
    (v4(198, 18, 0, 0, 15), "benchmarking address (198.18.0.0/15)"),
    (v4(198, 51, 100, 0, 24), "documentation address (198.51.100.0/24)"),
    (v4(203, 0, 113, 0, 24), "documentation address (203.0.113.0/24)"),
    (v4(224, 0, 0, 0, 4), "multicast address (224.0.0.0/4)"),
    (v4(240, 0, 0, 0, 4), "reserved address (240.0.0.0/4)"),
];

/// IPv6 ranges checked after the embedded-IPv4 forms.
const BLOCKED_V6: &[(Ipv6Net, &str)] = &[
    (v6(0xfe80, 10), "link-local address (fe80::/10)"),
    (v6(0xfec0, 10), "site-local address (fec0::/10)"),
    (v6(0xfc00, 7), "unique local address (fc00::/7)"),
    (
        Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32),
        "documentation address (2001:db8::/32)",
    ),
];

/// Prefixes whose last 32 bits carry an IPv4 host.
const IPV4_COMPATIBLE: Ipv6Net = Ipv6Net::new_assert(Ipv6Addr::UNSPECIFIED, 96);
const NAT64_WELL_KNOWN: Ipv6Net =
    Ipv6Net::new_assert(Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0), 96);

const fn v4(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Ipv4Net {
    Ipv4Net::new_assert(Ipv4Addr::new(a, b, c, d), prefix)
}

const fn v6(first: u16, prefix: u8) -> Ipv6Net {
    Ipv6Net::new_assert(Ipv6Addr::new(first, 0, 0, 0, 0, 0, 0, 0), prefix)
}

/// Check a normalized (lowercase, no trailing dot) hostname against the built-in list.
pub(crate) fn is_hostname_blocked(host: &str) -> Option<String> {
    for &blocked in BLOCKED_HOSTNAMES {
        if host == blocked || host.ends_with(&format!(".{}", blocked)) {
            return Some(format!("matches blocked name {}", blocked));
        }
    }

    // Single-label names are resolved through search domains, i.e. the local network.
    if !host.contains('.') {
        return Some("single-label hostname".to_string());
    }

    None
}

/// Check an IP address against the built-in ranges.
pub(crate) fn is_ip_blocked(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(ipv4) => is_ipv4_blocked(ipv4),
        IpAddr::V6(ipv6) => is_ipv6_blocked(ipv6),
    }
}

fn is_ipv4_blocked(ip: Ipv4Addr) -> Option<&'static str> {
    // Metadata endpoints sit inside broader ranges; report them by name.
    if is_metadata_ipv4(ip) {
        return Some("cloud metadata endpoint");
    }

    BLOCKED_V4
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, reason)| *reason)
}

fn is_ipv6_blocked(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_unspecified() {
        return Some("unspecified address (::)");
    }

    // Loopback before any IPv4 embedding checks: ::1 would otherwise read as 0.0.0.1
    if ip.is_loopback() {
        return Some("loopback address (::1)");
    }

    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_ipv4_blocked(ipv4);
    }

    // IPv4-compatible (::a.b.c.d), deprecated but still routed by some stacks,
    // and NAT64 (64:ff9b::/96), which reaches the embedded IPv4 host
    if IPV4_COMPATIBLE.contains(&ip) || NAT64_WELL_KNOWN.contains(&ip) {
        return is_ipv4_blocked(embedded_ipv4(ip));
    }

    if is_metadata_ipv6(ip) {
        return Some("cloud metadata endpoint");
    }

    if ip.is_multicast() {
        return Some("multicast address (ff00::/8)");
    }

    BLOCKED_V6
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, reason)| *reason)
}

fn embedded_ipv4(ip: Ipv6Addr) -> Ipv4Addr {
    let [.., a, b, c, d] = ip.octets();
    Ipv4Addr::new(a, b, c, d)
}

fn is_metadata_ipv4(ip: Ipv4Addr) -> bool {
    // AWS/GCP/Azure, then Alibaba Cloud
    ip == Ipv4Addr::new(169, 254, 169, 254) || ip == Ipv4Addr::new(100, 100, 100, 200)
}

fn is_metadata_ipv6(ip: Ipv6Addr) -> bool {
    // AWS: fd00:ec2::254
    ip == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254)
}
