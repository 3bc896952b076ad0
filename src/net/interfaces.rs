//! Host identity for certificate subjects: hostname and interface addresses.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// The machine's hostname.
#[cfg(unix)]
pub fn hostname() -> io::Result<String> {
    let name = nix::unistd::gethostname()?;
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
pub fn hostname() -> io::Result<String> {
    std::env::var("COMPUTERNAME").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

/// Every address assigned to a local interface.
#[cfg(unix)]
pub fn interface_addresses() -> io::Result<Vec<IpAddr>> {
    let addrs = nix::ifaddrs::getifaddrs()?
        .filter_map(|ifa| ifa.address)
        .filter_map(|addr| {
            if let Some(v4) = addr.as_sockaddr_in() {
                Some(IpAddr::V4(v4.ip()))
            } else {
                addr.as_sockaddr_in6().map(|v6| IpAddr::V6(v6.ip()))
            }
        })
        .collect();
    Ok(addrs)
}

#[cfg(not(unix))]
pub fn interface_addresses() -> io::Result<Vec<IpAddr>> {
    Ok(Vec::new())
}

/// Unicast addresses outside loopback, link-local, multicast and broadcast.
pub fn is_global_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_global_unicast_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_global_unicast_v4(&v4),
            None => {
                !v6.is_unspecified()
                    && !v6.is_loopback()
                    && !v6.is_multicast()
                    // fe80::/10
                    && (v6.segments()[0] & 0xffc0) != 0xfe80
            }
        },
    }
}

fn is_global_unicast_v4(ip: &Ipv4Addr) -> bool {
    !ip.is_unspecified()
        && !ip.is_loopback()
        && !ip.is_multicast()
        && !ip.is_link_local()
        && !ip.is_broadcast()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_unicast_classification() {
        let global = ["192.168.1.10", "10.0.0.1", "8.8.8.8", "2001:db8::1", "fd00::1"];
        for addr in global {
            assert!(is_global_unicast(&addr.parse().unwrap()), "{addr}");
        }

        let local = [
            "127.0.0.1",
            "0.0.0.0",
            "169.254.1.1",
            "224.0.0.1",
            "255.255.255.255",
            "::1",
            "::",
            "fe80::1",
            "ff02::1",
            "::ffff:127.0.0.1",
        ];
        for addr in local {
            assert!(!is_global_unicast(&addr.parse().unwrap()), "{addr}");
        }
    }

    #[test]
    fn test_hostname_is_not_empty() {
        assert!(!hostname().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_interface_addresses_include_loopback() {
        let addrs = interface_addresses().unwrap();
        assert!(addrs.iter().any(IpAddr::is_loopback), "{addrs:?}");
    }
}
