#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ssdp_aggregate::http::{AvailabilityChecker, DeviceInfoPublisher};
use ssdp_aggregate::ssdp::engine::{
    DeviceLocator, DeviceLocatorFactory, DevicePublisher, DevicePublisherFactory, EngineError,
    LocatorCallback, SubscriptionId,
};
use ssdp_aggregate::ssdp::{DiscoveredDevice, LocatorEvent, RootDevice};
use ssdp_aggregate::AggregateError;
use tokio_util::sync::CancellationToken;
use url::Url;

pub fn device(usn: &str, location: &str) -> DiscoveredDevice {
    DiscoveredDevice::new(usn, "upnp:rootdevice", Url::parse(location).unwrap())
}

// ---- Locator ----

#[derive(Default)]
pub struct LocatorState {
    pub address: String,
    pub port: u16,
    pub search_result: Option<Vec<DiscoveredDevice>>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, LocatorCallback)>>,
}

impl LocatorState {
    /// Raises `event` to everyone subscribed to this locator.
    pub fn emit(&self, event: LocatorEvent) {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect::<Vec<_>>();

        for callback in callbacks {
            callback(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }
}

pub struct MockLocator(Arc<LocatorState>);

#[async_trait::async_trait]
impl DeviceLocator for MockLocator {
    async fn search(&self) -> Result<Vec<DiscoveredDevice>, EngineError> {
        // Give the other locators a chance to run first
        tokio::task::yield_now().await;

        self.0.search_result.clone().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NetworkUnreachable,
                "search failed",
            ))
        })
    }

    fn start_listening(&self) -> Result<(), EngineError> {
        self.0.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_listening(&self) -> Result<(), EngineError> {
        self.0.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, callback: LocatorCallback) -> SubscriptionId {
        let id = SubscriptionId(self.0.next_id.fetch_add(1, Ordering::SeqCst));
        self.0.callbacks.lock().unwrap().push((id, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.0.callbacks.lock().unwrap().retain(|(v, _)| *v != id);
    }
}

/// Creates [`MockLocator`]s and remembers every one it created.
#[derive(Default)]
pub struct MockLocatorFactory {
    results: HashMap<String, Option<Vec<DiscoveredDevice>>>,
    created: Mutex<Vec<Arc<LocatorState>>>,
}

impl MockLocatorFactory {
    pub fn with_devices(mut self, address: &str, devices: Vec<DiscoveredDevice>) -> Self {
        self.results.insert(address.to_string(), Some(devices));
        self
    }

    pub fn with_failing_search(mut self, address: &str) -> Self {
        self.results.insert(address.to_string(), None);
        self
    }

    /// Address and port of every locator created, in creation order.
    pub fn created(&self) -> Vec<(String, u16)> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|v| (v.address.clone(), v.port))
            .collect()
    }

    pub fn locator(&self, address: &str) -> Arc<LocatorState> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.address == address)
            .cloned()
            .unwrap()
    }
}

impl DeviceLocatorFactory for MockLocatorFactory {
    fn create(&self, address: &str, port: u16) -> Result<Box<dyn DeviceLocator>, EngineError> {
        let state = Arc::new(LocatorState {
            address: address.to_string(),
            port,
            search_result: self
                .results
                .get(address)
                .cloned()
                .unwrap_or_else(|| Some(Vec::new())),
            ..Default::default()
        });

        self.created.lock().unwrap().push(state.clone());
        Ok(Box::new(MockLocator(state)))
    }
}

// ---- Publisher ----

#[derive(Default)]
pub struct PublisherState {
    pub address: String,
    pub port: u16,
    pub fail_add: bool,
    pub devices: Mutex<Vec<RootDevice>>,
    pub add_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

pub struct MockPublisher(Arc<PublisherState>);

impl DevicePublisher for MockPublisher {
    fn add_device(&self, device: RootDevice) -> Result<(), EngineError> {
        self.0.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_add {
            return Err(EngineError::NotListening);
        }

        self.0.devices.lock().unwrap().push(device);
        Ok(())
    }

    fn remove_device(&self, device: &RootDevice) -> Result<(), EngineError> {
        self.0.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.0
            .devices
            .lock()
            .unwrap()
            .retain(|v| v.uuid != device.uuid);
        Ok(())
    }

    fn devices(&self) -> Vec<RootDevice> {
        self.0.devices.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MockPublisherFactory {
    failing: HashSet<String>,
    created: Mutex<Vec<Arc<PublisherState>>>,
}

impl MockPublisherFactory {
    pub fn with_failing_add(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn created(&self) -> Vec<(String, u16)> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|v| (v.address.clone(), v.port))
            .collect()
    }

    pub fn publisher(&self, address: &str) -> Arc<PublisherState> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.address == address)
            .cloned()
            .unwrap()
    }
}

impl DevicePublisherFactory for MockPublisherFactory {
    fn create(&self, address: &str, port: u16) -> Result<Box<dyn DevicePublisher>, EngineError> {
        let state = Arc::new(PublisherState {
            address: address.to_string(),
            port,
            fail_add: self.failing.contains(address),
            ..Default::default()
        });

        self.created.lock().unwrap().push(state.clone());
        Ok(Box::new(MockPublisher(state)))
    }
}

// ---- Description server ----

/// Records calls instead of serving anything.
#[derive(Default)]
pub struct RecordingDescriptionServer {
    pub fail_bind: bool,
    pub documents: Mutex<HashMap<String, String>>,
    pub add_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub port: u16,
}

#[async_trait::async_trait]
impl DeviceInfoPublisher for RecordingDescriptionServer {
    fn add_device_info(&self, uuid: &str, document: String) {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .entry(uuid.to_string())
            .or_insert(document);
    }

    fn remove_device_info(&self, uuid: &str) {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.documents.lock().unwrap().remove(uuid);
    }

    async fn run(&self, _token: CancellationToken) -> Result<SocketAddr, AggregateError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bind {
            return Err(AggregateError::Bind {
                port: self.port,
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
            });
        }

        Ok(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            self.port,
        )))
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ---- Availability ----

/// Treats a fixed set of locations as reachable.
#[derive(Default)]
pub struct FixedChecker {
    pub alive: Mutex<HashSet<Url>>,
    pub probes: AtomicUsize,
}

#[async_trait::async_trait]
impl AvailabilityChecker for FixedChecker {
    async fn is_available(&self, location: &Url) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive.lock().unwrap().contains(location)
    }
}
