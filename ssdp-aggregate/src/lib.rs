//! Multi-interface SSDP discovery and advertisement.
//!
//! The per-interface SSDP engines are supplied by the caller through the factory traits in
//! [`ssdp::engine`]. This crate fans operations out across one engine per local unicast
//! address, keeps track of whether discovered devices still answer, and serves the
//! description documents of published devices over HTTP.

pub mod aggregate;
pub mod error;
pub mod http;
pub mod monitor;
pub mod net;
pub mod ssdp;

pub use aggregate::{AggregatableDeviceLocator, AggregatableDevicePublisher};
pub use error::AggregateError;
pub use crate::http::{DescriptionServer, DeviceInfoPublisher};
pub use monitor::{AvailabilityMonitor, MonitorConfig};
pub use ssdp::{DeviceEvent, DiscoveredDevice, RootDevice, UnavailableSource};
