use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use url::Url;

use crate::error::AggregateError;

pub mod device;
pub mod engine;
pub mod event;

pub use device::{DiscoveredDevice, RootDevice};
pub use event::{DeviceEvent, LocatorEvent, UnavailableSource};

/// Path prefix under which description documents are advertised.
pub const DESCRIPTION_PATH: &str = "/upnp/description/";

/// An IP address rendered the way it has to appear in the authority part of a URI.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct UriHost(pub IpAddr);

impl Display for UriHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            IpAddr::V4(addr) => Display::fmt(&addr, f),
            IpAddr::V6(addr) => write!(f, "[{}]", addr),
        }
    }
}

/// Parses a unicast address literal, rejecting anything that is not an IP address.
pub fn parse_unicast_address(address: &str) -> Result<IpAddr, AggregateError> {
    address
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| AggregateError::InvalidAddress(address.to_string()))
}

/// Renders `address` and `port` as a URI authority, bracket-quoting IPv6 literals.
///
/// `127.0.0.1` with port 3333 becomes `127.0.0.1:3333`, `::1` becomes `[::1]:3333`.
pub fn to_uri_address(address: &str, port: u16) -> Result<String, AggregateError> {
    let ip = parse_unicast_address(address)?;
    Ok(format!("{}:{}", UriHost(ip), port))
}

/// Builds the location a device is advertised under on the interface owning `ip`.
pub fn description_location(ip: IpAddr, port: u16, uuid: &str) -> Result<Url, AggregateError> {
    let location = format!("http://{}:{}{}{}", UriHost(ip), port, DESCRIPTION_PATH, uuid);
    Url::parse(&location).map_err(|err| AggregateError::InvalidLocation {
        location,
        source: err,
    })
}
