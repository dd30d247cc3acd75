use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::AvailabilityChecker;
use crate::ssdp::DiscoveredDevice;

/// Callback invoked for every device the monitor stopped tracking because its probe failed.
pub type UnavailableCallback = Arc<dyn Fn(DiscoveredDevice) + Send + Sync>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MonitorConfig {
    /// How long a single liveness probe may take.
    pub probe_timeout: Duration,

    /// Pause between two sweeps over all tracked devices.
    pub sweep_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// A tracked device and the insertion it stems from.
struct Tracked {
    device: DiscoveredDevice,
    generation: u64,
}

struct MonitorState {
    tracked: DashMap<Url, Tracked>,
    next_generation: AtomicU64,
    checker: Arc<dyn AvailabilityChecker>,
    config: MonitorConfig,
    on_unavailable: UnavailableCallback,
}

/// Periodically probes the description location of every tracked device and drops the ones
/// which stopped answering.
///
/// Devices are tracked by description location. A probe failure caused by the network is not
/// told apart from a device that went away.
pub struct AvailabilityMonitor {
    state: Arc<MonitorState>,
    token: Mutex<Option<CancellationToken>>,
}

impl AvailabilityMonitor {
    pub fn new(
        checker: Arc<dyn AvailabilityChecker>,
        config: MonitorConfig,
        on_unavailable: UnavailableCallback,
    ) -> Self {
        Self {
            state: Arc::new(MonitorState {
                tracked: DashMap::new(),
                next_generation: AtomicU64::new(0),
                checker,
                config,
                on_unavailable,
            }),
            token: Mutex::new(None),
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.state.config
    }

    /// Starts tracking a device. Returns false if its location was already tracked.
    pub fn add_device(&self, device: DiscoveredDevice) -> bool {
        match self.state.tracked.entry(device.description_location.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::trace!("Tracking {} at {}", device.usn, device.description_location);
                let generation = self.state.next_generation.fetch_add(1, Ordering::Relaxed);
                entry.insert(Tracked { device, generation });
                true
            }
        }
    }

    /// Stops tracking the device at `location`.
    pub fn remove_device(&self, location: &Url) -> Option<DiscoveredDevice> {
        self.state
            .tracked
            .remove(location)
            .map(|(_, tracked)| tracked.device)
    }

    pub fn is_tracked(&self, location: &Url) -> bool {
        self.state.tracked.contains_key(location)
    }

    /// Snapshot of all tracked devices.
    pub fn tracked(&self) -> Vec<DiscoveredDevice> {
        self.state
            .tracked
            .iter()
            .map(|entry| entry.value().device.clone())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Starts the sweep loop, replacing a loop which is already running.
    ///
    /// Outside of a Tokio runtime nothing is started and the monitor stays idle.
    pub fn run(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!("Can not start availability monitor: {}", err);
                return;
            }
        };

        let token = CancellationToken::new();
        if let Some(previous) = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        tracing::debug!(
            "Starting availability monitor (every {:?})",
            self.state.config.sweep_interval
        );
        runtime.spawn(Self::sweep_loop(self.state.clone(), token));
    }

    /// Stops the sweep loop. Devices stay tracked.
    pub fn stop(&self) {
        if let Some(token) = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tracing::debug!("Stopping availability monitor");
            token.cancel();
        }
    }

    async fn sweep_loop(state: Arc<MonitorState>, token: CancellationToken) {
        loop {
            if !Self::sweep(&state, &token).await {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(state.config.sweep_interval) => {},
            }
        }

        tracing::trace!("Availability monitor loop exited");
    }

    /// Probes every tracked device once. Returns false if cancelled midway.
    async fn sweep(state: &MonitorState, token: &CancellationToken) -> bool {
        let snapshot = state
            .tracked
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().generation))
            .collect::<Vec<_>>();

        for (location, generation) in snapshot {
            let probe = tokio::time::timeout(
                state.config.probe_timeout,
                state.checker.is_available(&location),
            );

            let available = tokio::select! {
                _ = token.cancelled() => return false,
                res = probe => res.unwrap_or(false),
            };

            if available {
                continue;
            }

            if token.is_cancelled() {
                return false;
            }

            // The entry may have been replaced while the check was running, only the checked one
            // goes. Only notify if this sweep is the one that removed it.
            if let Some((_, tracked)) = state
                .tracked
                .remove_if(&location, |_, v| v.generation == generation)
            {
                tracing::debug!("{} at {} stopped responding", tracked.device.usn, location);
                (state.on_unavailable)(tracked.device);
            }
        }

        true
    }
}

impl Drop for AvailabilityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
