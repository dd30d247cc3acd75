//! Seams to the per-interface discovery engines.
//!
//! The aggregates never speak SSDP themselves. They are handed a factory which creates one
//! locator or publisher bound to a single unicast address, and fan their operations out to
//! every instance created that way.

use std::sync::Arc;
use thiserror::Error;

use crate::ssdp::{DiscoveredDevice, LocatorEvent, RootDevice};

/// Callback a locator invokes for every availability change it observes.
pub type LocatorCallback = Arc<dyn Fn(LocatorEvent) + Send + Sync>;

/// Handle returned by a subscription, used to cancel it again.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SubscriptionId(pub u64);

#[async_trait::async_trait]
pub trait DeviceLocator: Send + Sync + 'static {
    /// Performs a search and returns every device that answered.
    async fn search(&self) -> Result<Vec<DiscoveredDevice>, EngineError>;

    /// Starts passively listening for advertisements.
    fn start_listening(&self) -> Result<(), EngineError>;

    /// Stops passively listening for advertisements.
    fn stop_listening(&self) -> Result<(), EngineError>;

    /// Registers a callback for availability changes.
    fn subscribe(&self, callback: LocatorCallback) -> SubscriptionId;

    /// Removes a callback registered with [`DeviceLocator::subscribe`].
    fn unsubscribe(&self, id: SubscriptionId);
}

pub trait DevicePublisher: Send + Sync + 'static {
    /// Starts advertising the device.
    fn add_device(&self, device: RootDevice) -> Result<(), EngineError>;

    /// Stops advertising the device.
    fn remove_device(&self, device: &RootDevice) -> Result<(), EngineError>;

    /// Devices currently advertised by this publisher.
    fn devices(&self) -> Vec<RootDevice>;
}

pub trait DeviceLocatorFactory: Send + Sync {
    /// Creates a locator bound to the interface owning `address`.
    fn create(&self, address: &str, port: u16) -> Result<Box<dyn DeviceLocator>, EngineError>;
}

pub trait DevicePublisherFactory: Send + Sync {
    /// Creates a publisher bound to the interface owning `address`.
    fn create(&self, address: &str, port: u16) -> Result<Box<dyn DevicePublisher>, EngineError>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid unicast address {0:?}")]
    InvalidAddress(String),

    #[error("engine is not listening")]
    NotListening,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine failed: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}
