use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::aggregate::validate_addresses;
use crate::error::AggregateError;
use crate::http::{DescriptionServer, DeviceInfoPublisher};
use crate::net::{AdapterNetworkInfo, NetworkInfoProvider};
use crate::ssdp::description_location;
use crate::ssdp::engine::{DevicePublisher, DevicePublisherFactory};
use crate::ssdp::RootDevice;

struct PublisherEntry {
    address: String,
    ip: IpAddr,
    publisher: Box<dyn DevicePublisher>,
}

/// Publishes devices on every local interface at once.
///
/// Each interface advertises its own copy of a device, located at an address of that
/// interface. The description document behind all copies is the same and is served once per
/// device uuid by the [`DeviceInfoPublisher`].
pub struct AggregatableDevicePublisher {
    publishers: Vec<PublisherEntry>,
    server: Arc<dyn DeviceInfoPublisher>,
    server_addr: SocketAddr,
    token: CancellationToken,
    shut_down: AtomicBool,
}

impl AggregatableDevicePublisher {
    /// Creates a publisher for every address in `unicast_addresses` and starts serving
    /// description documents on `port`.
    pub async fn new<I, S>(
        unicast_addresses: I,
        factory: &dyn DevicePublisherFactory,
        server: Arc<dyn DeviceInfoPublisher>,
        port: u16,
    ) -> Result<Self, AggregateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = validate_addresses(unicast_addresses)?;

        let mut publishers = Vec::with_capacity(addresses.len());
        for (address, ip) in addresses {
            let publisher = factory
                .create(&address, port)
                .map_err(|source| AggregateError::Engine {
                    address: address.clone(),
                    source,
                })?;

            tracing::debug!("Created publisher for {} on port {}", address, port);
            publishers.push(PublisherEntry {
                address,
                ip,
                publisher,
            });
        }

        let token = CancellationToken::new();
        let server_addr = server.run(token.clone()).await?;

        Ok(Self {
            publishers,
            server,
            server_addr,
            token,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Creates a publisher for every address reported by `network_info`.
    pub async fn with_network_info(
        network_info: &dyn NetworkInfoProvider,
        factory: &dyn DevicePublisherFactory,
        server: Arc<dyn DeviceInfoPublisher>,
        port: u16,
    ) -> Result<Self, AggregateError> {
        let addresses = network_info
            .unicast_addresses()
            .map_err(AggregateError::Network)?;

        Self::new(addresses, factory, server, port).await
    }

    /// Creates a publisher for every usable address of the local adapters, serving
    /// descriptions with a [`DescriptionServer`] on `port`.
    pub async fn create(
        factory: &dyn DevicePublisherFactory,
        port: u16,
    ) -> Result<Self, AggregateError> {
        let server = Arc::new(DescriptionServer::new(port));
        Self::with_network_info(&AdapterNetworkInfo, factory, server, port).await
    }

    /// Address the description server is listening on.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// The per-interface publishers and the address each one is bound to.
    pub fn publishers(&self) -> impl Iterator<Item = (&str, &dyn DevicePublisher)> {
        self.publishers
            .iter()
            .map(|entry| (entry.address.as_str(), entry.publisher.as_ref()))
    }

    /// Devices published on all interfaces, one entry per interface and device.
    pub fn devices(&self) -> Vec<RootDevice> {
        self.publishers
            .iter()
            .flat_map(|entry| entry.publisher.devices())
            .collect()
    }

    /// Publishes `device` on every interface.
    ///
    /// The device needs a uuid. Each interface advertises a copy located at
    /// `http://<interface address>:<port>/upnp/description/<uuid>`.
    pub fn add_device(&self, device: &RootDevice) -> Result<(), AggregateError> {
        if device.uuid.trim().is_empty() {
            return Err(AggregateError::MissingUuid);
        }

        // The advertised port is the one actually bound, which differs if 0 was requested
        let port = self.server_addr.port();
        let located = self
            .publishers
            .iter()
            .map(|entry| {
                description_location(entry.ip, port, &device.uuid)
                    .map(|location| (entry, device.with_location(location)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.server
            .add_device_info(&device.uuid, device.to_description_document());

        for (entry, device) in located {
            tracing::debug!(
                "Publishing {} on {} at {:?}",
                device.uuid,
                entry.address,
                device.location.as_ref().map(|v| v.as_str())
            );

            if let Err(err) = entry.publisher.add_device(device) {
                tracing::warn!("Failed to publish device on {}: {}", entry.address, err);
            }
        }

        Ok(())
    }

    /// Withdraws `device` from every interface and stops serving its description.
    pub fn remove_device(&self, device: &RootDevice) {
        self.server.remove_device_info(&device.uuid);

        for entry in &self.publishers {
            if let Err(err) = entry.publisher.remove_device(device) {
                tracing::warn!("Failed to remove device on {}: {}", entry.address, err);
            }
        }
    }

    /// Stops serving descriptions. Calling this again does nothing.
    ///
    /// Devices stay advertised by the per-interface publishers.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.token.cancel();
        self.server.stop();
        tracing::debug!("Publisher aggregate shut down");
    }
}

impl Drop for AggregatableDevicePublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
