use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::ssdp::engine::SubscriptionId;
use crate::ssdp::DeviceEvent;

/// Callback receiving the events of an aggregate locator.
pub type DeviceEventCallback = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Republishes events coming in from many sources to the subscribers of one aggregate.
///
/// Events are delivered synchronously on the task that raised them.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, DeviceEventCallback)>>,
}

impl EventDispatcher {
    pub fn subscribe(&self, callback: DeviceEventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(v, _)| *v != id);
    }

    pub fn dispatch(&self, event: &DeviceEvent) {
        // Listeners may subscribe or unsubscribe from within their callback
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect::<Vec<_>>();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssdp::{DiscoveredDevice, UnavailableSource};
    use std::sync::Mutex;

    fn event() -> DeviceEvent {
        DeviceEvent::Unavailable {
            device: DiscoveredDevice::new(
                "uuid:a",
                "upnp:rootdevice",
                url::Url::parse("http://10.0.0.1/desc").unwrap(),
            ),
            source: UnavailableSource::Probe,
        }
    }

    #[test]
    fn delivers_to_current_subscribers_only() {
        let dispatcher = EventDispatcher::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first_seen = seen.clone();
        let first = dispatcher.subscribe(Arc::new(move |_| first_seen.lock().unwrap().push(1)));
        let second_seen = seen.clone();
        dispatcher.subscribe(Arc::new(move |_| second_seen.lock().unwrap().push(2)));

        dispatcher.dispatch(&event());
        dispatcher.unsubscribe(first);
        dispatcher.dispatch(&event());

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 2]);
        assert_eq!(dispatcher.len(), 1);
    }
}
