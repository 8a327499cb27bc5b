//! IPv4 CIDR arithmetic.
//!
//! Fails soft throughout: a malformed dotted-quad or CIDR string is treated
//! as "no match" rather than raising. Contracts are bit-exact against
//! RFC-standard IPv4 behaviour only; IPv6 is out of scope.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// A parsed CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    /// Network address with host bits zeroed.
    pub network: u32,
    /// Prefix mask, e.g. `/24` -> `0xffffff00`.
    pub mask: u32,
    /// Prefix length, 0-32.
    pub prefix: u8,
    /// The original string this was parsed from.
    pub raw: String,
}

/// Convert a dotted-quad `Ipv4Addr` to its `u32` representation.
pub fn ip_to_int(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

/// Convert a `u32` back to a dotted-quad `Ipv4Addr`.
pub fn int_to_ip(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(n)
}

fn mask_for_prefix(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

/// Parse `a.b.c.d/p`. A bare dotted-quad is treated as `/32`. Returns `None`
/// on any malformed input rather than raising — this is the one fails-soft
/// boundary every caller in this crate relies on.
pub fn parse_cidr(s: &str) -> Option<Cidr> {
    let s = s.trim();

    // A bare address has no slash; ipnetwork's FromStr for Ipv4Network
    // requires one, so fall back to parsing it as a host address at /32.
    let network: Ipv4Network = match s.parse() {
        Ok(n) => n,
        Err(_) => {
            let addr: Ipv4Addr = s.parse().ok()?;
            Ipv4Network::new(addr, 32).ok()?
        }
    };

    let prefix = network.prefix();
    let mask = mask_for_prefix(prefix);
    let net = ip_to_int(network.network()) & mask;

    Some(Cidr {
        network: net,
        mask,
        prefix,
        raw: s.to_string(),
    })
}

/// Does `cidr` contain `ip`? Malformed `ip` is treated as "no match".
pub fn ip_in_cidr(ip: &str, cidr: &Cidr) -> bool {
    let Ok(addr) = ip.trim().parse::<Ipv4Addr>() else {
        return false;
    };
    (ip_to_int(addr) & cidr.mask) == cidr.network
}

/// A single longest-prefix-match candidate: a CIDR string paired with
/// whatever payload the caller wants back on a match (e.g. a gateway OCID).
pub struct Route<'a, T> {
    /// Destination CIDR string, e.g. `"10.0.0.0/16"`.
    pub cidr: &'a str,
    /// Payload returned on a match.
    pub target: T,
}

/// Longest-prefix match over `routes` for `ip`. Ties are broken by scan
/// order: among equal-prefix matches, the first one wins. Malformed route
/// CIDRs are skipped (treated as non-matching), never cause an error.
/// Returns `None` if no route matches.
pub fn longest_prefix_match<'a, T>(ip: &str, routes: &'a [Route<'a, T>]) -> Option<&'a T> {
    let addr: Ipv4Addr = ip.trim().parse().ok()?;
    let addr_int = ip_to_int(addr);

    let mut best: Option<(u8, &'a T)> = None;

    for route in routes {
        let Some(cidr) = parse_cidr(route.cidr) else {
            continue;
        };
        if (addr_int & cidr.mask) != cidr.network {
            continue;
        }
        match best {
            Some((best_prefix, _)) if best_prefix >= cidr.prefix => {}
            _ => best = Some((cidr.prefix, &route.target)),
        }
    }

    best.map(|(_, target)| target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10.0.0.0/24", Some((167772160, 4294967040, 24)) ; "simple slash 24")]
    #[test_case("10.0.0.5", Some((167772165, u32::MAX, 32)) ; "bare ip defaults to slash 32")]
    #[test_case("0.0.0.0/0", Some((0, 0, 0)) ; "slash 0 yields zero mask")]
    #[test_case("not-an-ip/24", None ; "malformed address")]
    #[test_case("10.0.0.0/33", None ; "prefix out of range")]
    #[test_case("10.0.0.0/abc", None ; "non numeric prefix")]
    fn test_parse_cidr(input: &str, expected: Option<(u32, u32, u8)>) {
        let got = parse_cidr(input).map(|c| (c.network, c.mask, c.prefix));
        assert_eq!(got, expected);
    }

    #[test]
    fn ip_to_int_int_to_ip_round_trip() {
        for s in ["0.0.0.0", "10.1.2.3", "255.255.255.255", "192.168.1.1"] {
            let addr: Ipv4Addr = s.parse().unwrap();
            let back = int_to_ip(ip_to_int(addr));
            assert_eq!(addr, back);
            assert_eq!(parse_cidr(&back.to_string()), parse_cidr(s));
        }
    }

    #[test_case("10.0.1.5", "10.0.1.0/24", true ; "inside")]
    #[test_case("10.0.2.5", "10.0.1.0/24", false ; "outside")]
    #[test_case("anything-goes", "0.0.0.0/0", true ; "slash zero matches everything")]
    #[test_case("not-an-ip", "10.0.0.0/8", false ; "malformed ip never matches")]
    fn test_ip_in_cidr(ip: &str, cidr: &str, expected: bool) {
        let cidr = parse_cidr(cidr).unwrap();
        assert_eq!(ip_in_cidr(ip, &cidr), expected);
    }

    #[test]
    fn zero_slash_zero_matches_every_dotted_quad() {
        let cidr = parse_cidr("0.0.0.0/0").unwrap();
        for s in ["1.2.3.4", "255.255.255.255", "0.0.0.0"] {
            assert!(ip_in_cidr(s, &cidr));
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let routes = vec![
            Route {
                cidr: "0.0.0.0/0",
                target: "igw",
            },
            Route {
                cidr: "10.0.0.0/16",
                target: "drg",
            },
            Route {
                cidr: "10.0.1.0/24",
                target: "lpg",
            },
        ];
        assert_eq!(longest_prefix_match("10.0.1.5", &routes), Some(&"lpg"));
        assert_eq!(longest_prefix_match("10.0.2.5", &routes), Some(&"drg"));
        assert_eq!(longest_prefix_match("8.8.8.8", &routes), Some(&"igw"));
    }

    #[test]
    fn ties_broken_by_scan_order() {
        let routes = vec![
            Route {
                cidr: "10.0.0.0/24",
                target: "first",
            },
            Route {
                cidr: "10.0.0.0/24",
                target: "second",
            },
        ];
        assert_eq!(longest_prefix_match("10.0.0.5", &routes), Some(&"first"));
    }

    #[test]
    fn no_match_returns_none() {
        let routes = vec![Route {
            cidr: "10.0.0.0/24",
            target: "only",
        }];
        assert_eq!(longest_prefix_match("192.168.1.1", &routes), None);
    }

    #[test]
    fn malformed_route_cidr_is_skipped_not_fatal() {
        let routes = vec![
            Route {
                cidr: "garbage",
                target: "bad",
            },
            Route {
                cidr: "10.0.0.0/24",
                target: "good",
            },
        ];
        assert_eq!(longest_prefix_match("10.0.0.5", &routes), Some(&"good"));
    }
}
