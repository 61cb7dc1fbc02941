//! The JavaScript bridge.
//!
//! The page posts `[requestId, serviceName, methodName, ...args]` strings into
//! [`CueBridge::post_message`]. Each message is decoded once into a typed
//! [`Call`], dispatched on its own task, and answered exactly once through a
//! [`Responder`] with `cueSDKCallback(...)`. Out-of-band events go out as
//! `cueSDKNotification(...)`.

mod messenger;
mod services;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::BridgeConfig;
use crate::effects::{FlashEffects, TorchController};
use crate::error::Result;
use crate::loader::NetworkStatus;
use crate::platform::{Platform, PreviewTorch};
use crate::protocol::{self, Call, Notification, RequestId};

pub use messenger::{run_script_pump, Messenger, Responder};

/// Notification channel for connectivity changes
pub const NETWORK_STATE_CHANNEL: &str = "network-state";
/// Notification channel for timeline events
pub const TIMELINE_CHANNEL: &str = "timeline";

pub struct CueBridge {
    platform: Platform,
    torch: Arc<TorchController>,
    effects: FlashEffects,
    cache: Arc<CacheStore>,
    messenger: Messenger,
    network: watch::Sender<NetworkStatus>,
    pending_permissions: Mutex<HashMap<RequestId, Responder>>,
    scoped_storage_api_level: u32,
    shutdown: CancellationToken,
    runtime: Handle,
}

impl CueBridge {
    /// Must be called from within a tokio runtime; dispatch tasks are spawned on it
    pub fn new(
        platform: Platform,
        cache: Arc<CacheStore>,
        messenger: Messenger,
        config: &BridgeConfig,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()?;
        let shutdown = CancellationToken::new();
        let torch = Arc::new(TorchController::new(Arc::clone(&platform.torch)));
        let effects = FlashEffects::new(Arc::clone(&torch), config.blink_interval(), shutdown.clone());
        let (network, _) = watch::channel(NetworkStatus::Unknown);

        Ok(Arc::new(Self {
            platform,
            torch,
            effects,
            cache,
            messenger,
            network,
            pending_permissions: Mutex::new(HashMap::new()),
            scoped_storage_api_level: config.scoped_storage_api_level,
            shutdown,
            runtime,
        }))
    }

    /// Entry point for strings posted by the page.
    ///
    /// Never blocks: the request is handled on a runtime task. Messages without
    /// a usable request id are logged and dropped.
    pub fn post_message(self: &Arc<Self>, message: &str) {
        debug!("[CueSDK] Received message from JavaScript: {}", message);

        match protocol::decode(message) {
            Ok(request) => {
                let responder = self.messenger.responder(request.id);
                let bridge = Arc::clone(self);
                self.runtime.spawn(async move {
                    bridge.dispatch(request.call, responder).await;
                });
            }
            Err(e) => match e.request_id() {
                Some(request_id) => self.messenger.responder(request_id).reject(e.to_string()),
                None => warn!("[CueSDK] Dropped message {}: {}", message, e),
            },
        }
    }

    async fn dispatch(&self, call: Call, responder: Responder) {
        match call {
            Call::Torch(call) => self.handle_torch(call, responder).await,
            Call::Vibrate { duration } => self.handle_vibrate(duration, responder),
            Call::Storage(call) => self.handle_storage(call, responder).await,
            Call::Permissions(call) => self.handle_permissions(call, responder),
            Call::OpenCamera(layout) => {
                self.platform.host.show_camera(layout);
                responder.resolve(serde_json::Value::Null);
            }
            Call::NetworkState => responder.resolve(self.network_status().as_str()),
            Call::Timeline { active } => {
                self.platform.host.set_timeline_active(active);
                responder.resolve(true);
            }
        }
    }

    /// Outcome of a permission dialog started by a `get*Permission` call
    pub fn on_permission_result(&self, request_id: RequestId, granted: bool) {
        let pending = self
            .pending_permissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
        match pending {
            Some(responder) => responder.resolve(granted),
            None => warn!("[CueSDK] Permission result for unknown request {}", request_id),
        }
    }

    /// Record the new connectivity state and tell the page
    pub fn notify_internet_connection(&self, status: NetworkStatus) {
        info!("[CueSDK] Network state: {}", status.as_str());
        self.network.send_replace(status);
        self.messenger
            .send_notification(&Notification::new(NETWORK_STATE_CHANNEL, status.as_str()));
    }

    pub fn notify_timeline_break(&self) {
        self.messenger
            .send_notification(&Notification::new(TIMELINE_CHANNEL, "break"));
    }

    /// Last state passed to [`CueBridge::notify_internet_connection`]
    pub fn network_status(&self) -> NetworkStatus {
        *self.network.borrow()
    }

    /// The host reports the live camera preview's torch while it is open
    pub fn set_preview_torch(&self, preview: Option<Arc<dyn PreviewTorch>>) {
        self.torch.set_preview(preview);
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Host teardown: stop running effects and fail pending permission requests
    pub fn shutdown(&self) {
        info!("[CueSDK] Shutting down");
        self.shutdown.cancel();
        let pending: Vec<Responder> = self
            .pending_permissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, responder)| responder)
            .collect();
        for responder in pending {
            responder.reject("Bridge was shut down");
        }
    }
}
