//! # Connectivity Monitor
//!
//! Process-wide online/offline signal. The current value lives in a
//! `tokio::sync::watch` channel so readers get it synchronously and waiters
//! are woken on every transition. Every transition is also published on the
//! event bus as [`ConnectivityEvent::Changed`].
//!
//! ```rust
//! use core_runtime::connectivity::ConnectivityMonitor;
//! use core_runtime::events::EventBus;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let monitor = ConnectivityMonitor::new(true, EventBus::default());
//! let mut changes = monitor.subscribe();
//!
//! monitor.set_online(false);
//! changes.changed().await.unwrap();
//! assert!(!*changes.borrow());
//! # }
//! ```

use std::sync::Arc;

use bridge_traits::NetworkMonitor;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{ConnectivityEvent, CoreEvent, EventBus};

/// Observable online flag shared by the queue manager and the UI.
///
/// Cloning shares the same underlying channel.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
    event_bus: EventBus,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool, event_bus: EventBus) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self {
            sender: Arc::new(sender),
            event_bus,
        }
    }

    /// Seed from the platform signal and follow its change stream.
    ///
    /// Returns the monitor plus the handle of the listener task. The
    /// listener ends when the platform stream closes. If the platform cannot
    /// provide a change stream the monitor keeps the seeded value and only
    /// moves through [`set_online`](Self::set_online).
    pub async fn from_platform(
        network: Arc<dyn NetworkMonitor>,
        event_bus: EventBus,
    ) -> (Self, Option<JoinHandle<()>>) {
        let online = network.is_connected().await;
        info!(online, "Connectivity monitor seeded from platform");
        let monitor = Self::new(online, event_bus);

        let mut stream = match network.subscribe_changes().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Platform network change stream unavailable");
                return (monitor, None);
            }
        };

        let listener = monitor.clone();
        let handle = tokio::spawn(async move {
            while let Some(info) = stream.next().await {
                listener.set_online(info.is_online());
            }
            debug!("Platform network change stream closed");
        });

        (monitor, Some(handle))
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Receiver that observes every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Update the flag. Setting the current value is a no-op: no wakeup, no event.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
            self.event_bus
                .emit(CoreEvent::Connectivity(ConnectivityEvent::Changed { online }))
                .ok();
        }
    }
}
