//! Aggregates fanning discovery and advertisement out to one engine per local interface.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::AggregateError;
use crate::ssdp::parse_unicast_address;

pub mod dispatch;
pub mod locator;
pub mod publisher;

pub use dispatch::{DeviceEventCallback, EventDispatcher};
pub use locator::AggregatableDeviceLocator;
pub use publisher::AggregatableDevicePublisher;

/// Validates all addresses before anything is created for them.
///
/// Addresses naming the same IP are collapsed into the first one, so no interface ends up
/// with two engines.
fn validate_addresses<I, S>(addresses: I) -> Result<Vec<(String, IpAddr)>, AggregateError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for address in addresses {
        let address = address.as_ref().trim();
        let ip = parse_unicast_address(address)?;

        if !seen.insert(ip) {
            tracing::warn!("Ignoring duplicate unicast address {}", address);
            continue;
        }

        out.push((address.to_string(), ip));
    }

    Ok(out)
}
