use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::{validate_addresses, DeviceEventCallback, EventDispatcher};
use crate::error::AggregateError;
use crate::http::{AvailabilityChecker, HttpAvailabilityChecker};
use crate::monitor::{AvailabilityMonitor, MonitorConfig};
use crate::net::{AdapterNetworkInfo, NetworkInfoProvider};
use crate::ssdp::engine::{DeviceLocator, DeviceLocatorFactory, SubscriptionId};
use crate::ssdp::{DeviceEvent, DiscoveredDevice, LocatorEvent, UnavailableSource};

struct LocatorEntry {
    address: String,
    locator: Box<dyn DeviceLocator>,
    subscription: SubscriptionId,
}

/// Discovers devices on every local interface at once.
///
/// Searches are broadcast to one locator per unicast address and their results concatenated.
/// Availability events of all locators are merged into a single stream, optionally backed by
/// an [`AvailabilityMonitor`] which also reports devices that vanished without a byebye.
pub struct AggregatableDeviceLocator {
    locators: Vec<LocatorEntry>,
    dispatcher: Arc<EventDispatcher>,
    monitor: Arc<AvailabilityMonitor>,
    monitoring: Arc<AtomicBool>,
    shut_down: AtomicBool,
}

impl AggregatableDeviceLocator {
    /// Creates a locator for every address in `unicast_addresses`.
    pub fn new<I, S>(
        unicast_addresses: I,
        factory: &dyn DeviceLocatorFactory,
        port: u16,
    ) -> Result<Self, AggregateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let config = MonitorConfig::default();
        let checker = HttpAvailabilityChecker::new(config.probe_timeout)?;

        Self::with_monitor(unicast_addresses, factory, port, Arc::new(checker), config)
    }

    /// Creates a locator for every address reported by `network_info`.
    pub fn with_network_info(
        network_info: &dyn NetworkInfoProvider,
        factory: &dyn DeviceLocatorFactory,
        port: u16,
    ) -> Result<Self, AggregateError> {
        let addresses = network_info
            .unicast_addresses()
            .map_err(AggregateError::Network)?;

        Self::new(addresses, factory, port)
    }

    /// Creates a locator for every usable address of the local adapters.
    pub fn create(factory: &dyn DeviceLocatorFactory, port: u16) -> Result<Self, AggregateError> {
        Self::with_network_info(&AdapterNetworkInfo, factory, port)
    }

    /// Creates a locator for every address in `unicast_addresses`, probing availability with
    /// `checker`.
    pub fn with_monitor<I, S>(
        unicast_addresses: I,
        factory: &dyn DeviceLocatorFactory,
        port: u16,
        checker: Arc<dyn AvailabilityChecker>,
        config: MonitorConfig,
    ) -> Result<Self, AggregateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = validate_addresses(unicast_addresses)?;

        let dispatcher = Arc::new(EventDispatcher::default());
        let monitoring = Arc::new(AtomicBool::new(false));

        let monitor = {
            let dispatcher = dispatcher.clone();
            Arc::new(AvailabilityMonitor::new(
                checker,
                config,
                Arc::new(move |device| {
                    dispatcher.dispatch(&DeviceEvent::Unavailable {
                        device,
                        source: UnavailableSource::Probe,
                    })
                }),
            ))
        };

        let mut locators = Vec::with_capacity(addresses.len());
        for (address, _) in addresses {
            let locator = factory
                .create(&address, port)
                .map_err(|source| AggregateError::Engine {
                    address: address.clone(),
                    source,
                })?;

            let subscription = locator.subscribe(Self::forward_events(
                dispatcher.clone(),
                monitor.clone(),
                monitoring.clone(),
            ));

            tracing::debug!("Created locator for {} on port {}", address, port);
            locators.push(LocatorEntry {
                address,
                locator,
                subscription,
            });
        }

        Ok(Self {
            locators,
            dispatcher,
            monitor,
            monitoring,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Adapter feeding the events of one locator into the shared dispatcher.
    fn forward_events(
        dispatcher: Arc<EventDispatcher>,
        monitor: Arc<AvailabilityMonitor>,
        monitoring: Arc<AtomicBool>,
    ) -> Arc<dyn Fn(LocatorEvent) + Send + Sync> {
        Arc::new(move |event| {
            let monitoring = monitoring.load(Ordering::Acquire);

            match &event {
                LocatorEvent::Available {
                    device,
                    newly_discovered: true,
                } if monitoring => {
                    monitor.add_device(device.clone());
                }
                LocatorEvent::Unavailable { device, .. } if monitoring => {
                    monitor.remove_device(&device.description_location);
                }
                _ => {}
            }

            dispatcher.dispatch(&DeviceEvent::from(event));
        })
    }

    /// The per-interface locators and the address each one is bound to.
    pub fn locators(&self) -> impl Iterator<Item = (&str, &dyn DeviceLocator)> {
        self.locators
            .iter()
            .map(|entry| (entry.address.as_str(), entry.locator.as_ref()))
    }

    /// Enables or disables liveness probing of discovered devices.
    ///
    /// Takes effect for devices discovered afterwards and on the next
    /// [`start_listening`](Self::start_listening).
    pub fn set_monitoring(&self, enabled: bool) {
        self.monitoring.store(enabled, Ordering::Release);
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    /// The monitor probing discovered devices.
    pub fn monitor(&self) -> &AvailabilityMonitor {
        &self.monitor
    }

    /// Registers a callback for availability changes reported by any interface.
    pub fn subscribe(&self, callback: DeviceEventCallback) -> SubscriptionId {
        self.dispatcher.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.dispatcher.unsubscribe(id)
    }

    /// Searches on all interfaces at once.
    ///
    /// Results are concatenated in locator order. A failing locator is logged and skipped, so
    /// this never fails as a whole.
    pub async fn search(&self) -> Vec<DiscoveredDevice> {
        let results = futures::future::join_all(
            self.locators
                .iter()
                .map(|entry| async move { (entry, entry.locator.search().await) }),
        )
        .await;

        let mut devices = Vec::new();
        for (entry, result) in results {
            match result {
                Ok(found) => {
                    tracing::trace!("Found {} devices on {}", found.len(), entry.address);
                    devices.extend(found);
                }
                Err(err) => {
                    tracing::warn!("Search on {} failed: {}", entry.address, err);
                }
            }
        }

        devices
    }

    /// Starts listening for advertisements on all interfaces, and starts probing discovered
    /// devices if monitoring is enabled.
    ///
    /// Availability checks need a Tokio runtime. Outside of one the locators still start listening
    /// but the monitor stays idle.
    pub fn start_listening(&self) {
        for entry in &self.locators {
            if let Err(err) = entry.locator.start_listening() {
                tracing::warn!("Failed to start listening on {}: {}", entry.address, err);
            }
        }

        if self.is_monitoring() {
            self.monitor.run();
        }
    }

    /// Stops listening on all interfaces and stops probing.
    pub fn stop_listening(&self) {
        for entry in &self.locators {
            if let Err(err) = entry.locator.stop_listening() {
                tracing::warn!("Failed to stop listening on {}: {}", entry.address, err);
            }
        }

        self.monitor.stop();
    }

    /// Detaches from all locators and stops them. Calling this again does nothing.
    ///
    /// The locators themselves stay alive until the aggregate is dropped.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        for entry in &self.locators {
            entry.locator.unsubscribe(entry.subscription);
            if let Err(err) = entry.locator.stop_listening() {
                tracing::warn!("Failed to stop listening on {}: {}", entry.address, err);
            }
        }

        self.monitor.stop();
        tracing::debug!("Locator aggregate shut down");
    }
}

impl Drop for AggregatableDeviceLocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
