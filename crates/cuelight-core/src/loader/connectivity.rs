//! Online/offline tracking.
//!
//! Platform availability callbacks arrive in bursts while the network settles,
//! so each one schedules a re-check after a short debounce; only the latest
//! scheduled check runs, and only a real change is published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::observer::Subscription;
use crate::platform::Connectivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    /// Nothing reported yet
    #[default]
    Unknown,
    On,
    Off,
}

impl NetworkStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            NetworkStatus::On
        } else {
            NetworkStatus::Off
        }
    }

    /// The string the page sees for `network.getState`
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Unknown => "",
            NetworkStatus::On => "on",
            NetworkStatus::Off => "off",
        }
    }

    pub fn is_offline(&self) -> bool {
        *self == NetworkStatus::Off
    }
}

type ChangeHandler = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

struct TrackerState {
    connectivity: Weak<dyn Connectivity>,
    status: watch::Sender<NetworkStatus>,
    generation: AtomicU64,
    debounce: Duration,
    on_change: ChangeHandler,
}

impl TrackerState {
    /// Re-read connectivity and publish it if it changed
    fn refresh(&self, tag: &str) {
        let Some(connectivity) = self.connectivity.upgrade() else {
            return;
        };
        let status = NetworkStatus::from_online(connectivity.is_online());
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(
                "[WebViewLink] Network connection is {} ({})",
                status.as_str().to_uppercase(),
                tag
            );
            (self.on_change)(status);
        }
    }
}

pub struct ConnectivityTracker {
    state: Arc<TrackerState>,
    _subscription: Subscription,
}

impl ConnectivityTracker {
    /// Read the current state, publish it, and follow platform callbacks from now on.
    ///
    /// `on_change` runs for the initial state and for every later change.
    pub fn start(
        connectivity: Arc<dyn Connectivity>,
        debounce: Duration,
        runtime: Handle,
        on_change: impl Fn(NetworkStatus) + Send + Sync + 'static,
    ) -> Self {
        let (status, _) = watch::channel(NetworkStatus::Unknown);
        let state = Arc::new(TrackerState {
            connectivity: Arc::downgrade(&connectivity),
            status,
            generation: AtomicU64::new(0),
            debounce,
            on_change: Arc::new(on_change),
        });
        state.refresh("initial");

        let weak = Arc::downgrade(&state);
        let subscription = connectivity.watch_availability(Box::new(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;
            runtime.spawn(async move {
                tokio::time::sleep(state.debounce).await;
                if state.generation.load(Ordering::SeqCst) == generation {
                    state.refresh("availability changed");
                } else {
                    debug!("[WebViewLink] Connectivity check superseded");
                }
            });
        }));

        Self { state, _subscription: subscription }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.state.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.state.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeConnectivity;
    use std::sync::Mutex;

    fn tracker(
        connectivity: Arc<FakeConnectivity>,
    ) -> (ConnectivityTracker, Arc<Mutex<Vec<NetworkStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ConnectivityTracker::start(
            connectivity,
            Duration::from_millis(50),
            Handle::current(),
            move |status| sink.lock().unwrap().push(status),
        );
        (tracker, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_published() {
        let (tracker, seen) = tracker(FakeConnectivity::new(true));
        assert_eq!(tracker.status(), NetworkStatus::On);
        assert_eq!(*seen.lock().unwrap(), vec![NetworkStatus::On]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_is_debounced() {
        let connectivity = FakeConnectivity::new(true);
        let (tracker, seen) = tracker(connectivity.clone());
        let mut rx = tracker.subscribe();

        connectivity.set_online(false);
        connectivity.set_online(true);
        connectivity.set_online(false);
        assert_eq!(tracker.status(), NetworkStatus::On);

        rx.changed().await.unwrap();
        assert_eq!(tracker.status(), NetworkStatus::Off);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![NetworkStatus::On, NetworkStatus::Off]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_state_is_not_republished() {
        let connectivity = FakeConnectivity::new(true);
        let (_tracker, seen) = tracker(connectivity.clone());

        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![NetworkStatus::On]);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(NetworkStatus::Unknown.as_str(), "");
        assert_eq!(NetworkStatus::from_online(true).as_str(), "on");
        assert!(NetworkStatus::from_online(false).is_offline());
    }
}
