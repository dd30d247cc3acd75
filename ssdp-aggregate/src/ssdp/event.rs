use crate::ssdp::DiscoveredDevice;

/// Notification raised by a single per-interface locator.
#[derive(Debug, Clone)]
pub enum LocatorEvent {
    Available {
        device: DiscoveredDevice,
        newly_discovered: bool,
    },
    Unavailable {
        device: DiscoveredDevice,
        /// The advertisement timed out instead of being revoked with a byebye.
        expired: bool,
    },
}

/// How the unavailability of a device was detected.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UnavailableSource {
    /// Reported by one of the locators (byebye or cache expiry).
    Protocol { expired: bool },

    /// The description location stopped answering liveness probes.
    Probe,
}

/// Notification raised by an aggregate locator.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Available {
        device: DiscoveredDevice,
        newly_discovered: bool,
    },
    Unavailable {
        device: DiscoveredDevice,
        source: UnavailableSource,
    },
}

impl DeviceEvent {
    pub fn device(&self) -> &DiscoveredDevice {
        match self {
            DeviceEvent::Available { device, .. } => device,
            DeviceEvent::Unavailable { device, .. } => device,
        }
    }

    /// Returns true if this is an unavailability detected by probing.
    pub fn is_probe_detected(&self) -> bool {
        matches!(
            self,
            DeviceEvent::Unavailable {
                source: UnavailableSource::Probe,
                ..
            }
        )
    }
}

impl From<LocatorEvent> for DeviceEvent {
    fn from(event: LocatorEvent) -> Self {
        match event {
            LocatorEvent::Available {
                device,
                newly_discovered,
            } => DeviceEvent::Available {
                device,
                newly_discovered,
            },
            LocatorEvent::Unavailable { device, expired } => DeviceEvent::Unavailable {
                device,
                source: UnavailableSource::Protocol { expired },
            },
        }
    }
}
