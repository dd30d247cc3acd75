use std::ffi::CStr;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::net::AdapterAddress;

/// Lists every IP address of every adapter together with the adapter flags.
pub fn get_adapter_addresses() -> Result<Vec<AdapterAddress>, std::io::Error> {
    let mut addresses = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut addresses) } == -1 {
        return Err(std::io::Error::last_os_error());
    }

    let mut out = Vec::new();

    let mut next = addresses;
    while !next.is_null() {
        let current = unsafe { &*next };
        next = current.ifa_next;

        if current.ifa_addr.is_null() {
            continue;
        }

        let family = unsafe { (*current.ifa_addr).sa_family } as libc::c_int;
        let addr = match family {
            libc::AF_INET => {
                let address = unsafe { &*(current.ifa_addr as *const libc::sockaddr_in) };
                IpAddr::V4(Ipv4Addr::from(address.sin_addr.s_addr.to_ne_bytes()))
            }

            libc::AF_INET6 => {
                let address = unsafe { &*(current.ifa_addr as *const libc::sockaddr_in6) };
                IpAddr::V6(Ipv6Addr::from(address.sin6_addr.s6_addr))
            }

            // Link layer and other families
            _ => continue,
        };

        let adapter = if current.ifa_name.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(current.ifa_name) }
                .to_string_lossy()
                .into_owned()
        };

        let flags = current.ifa_flags as libc::c_int;
        out.push(AdapterAddress {
            adapter,
            addr,
            up: flags & libc::IFF_UP != 0,
            multicast: flags & libc::IFF_MULTICAST != 0,
            loopback: flags & libc::IFF_LOOPBACK != 0,
        });
    }

    unsafe { libc::freeifaddrs(addresses) };

    tracing::trace!("Adapter addresses: {:?}", out);

    Ok(out)
}
