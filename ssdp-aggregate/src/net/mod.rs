use std::net::IpAddr;

#[cfg(unix)]
#[path = "unix.rs"]
mod platform;

mod port;

pub use port::{first_free_port, FIRST_CANDIDATE_PORT, PORT_CANDIDATES};

/// Source of the local unicast addresses to bind engines to.
pub trait NetworkInfoProvider: Send + Sync {
    /// Returns one IPv4 and one IPv6 address (if any) of every usable adapter.
    fn unicast_addresses(&self) -> Result<Vec<String>, std::io::Error>;
}

/// Enumerates the adapters of this host.
///
/// Only adapters which are up, support multicast and are not loopback are used. Link-local
/// IPv6 addresses are skipped since they can not be used without a scope id.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdapterNetworkInfo;

impl NetworkInfoProvider for AdapterNetworkInfo {
    #[cfg(unix)]
    fn unicast_addresses(&self) -> Result<Vec<String>, std::io::Error> {
        let adapters = platform::get_adapter_addresses()?;
        Ok(select_unicast_addresses(&adapters))
    }

    #[cfg(not(unix))]
    fn unicast_addresses(&self) -> Result<Vec<String>, std::io::Error> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "interface enumeration is not supported on this platform",
        ))
    }
}

/// One address assigned to a network adapter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AdapterAddress {
    pub adapter: String,
    pub addr: IpAddr,
    pub up: bool,
    pub multicast: bool,
    pub loopback: bool,
}

/// Picks the first usable IPv4 and IPv6 address of every usable adapter, in adapter order.
pub fn select_unicast_addresses(adapters: &[AdapterAddress]) -> Vec<String> {
    let mut adapter_order = Vec::<&str>::new();
    for address in adapters {
        if !adapter_order.contains(&address.adapter.as_str()) {
            adapter_order.push(&address.adapter);
        }
    }

    let mut out = Vec::new();
    for adapter in adapter_order {
        let usable = adapters
            .iter()
            .filter(|v| v.adapter == adapter)
            .filter(|v| v.up && v.multicast && !v.loopback)
            .filter(|v| !v.addr.is_loopback() && !v.addr.is_unspecified())
            .collect::<Vec<_>>();

        if let Some(v4) = usable.iter().find(|v| v.addr.is_ipv4()) {
            out.push(v4.addr.to_string());
        }

        if let Some(v6) = usable
            .iter()
            .find(|v| matches!(v.addr, IpAddr::V6(addr) if !is_ipv6_link_local(&addr)))
        {
            out.push(v6.addr.to_string());
        }
    }

    tracing::trace!("Usable unicast addresses: {:?}", out);

    out
}

fn is_ipv6_link_local(addr: &std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
