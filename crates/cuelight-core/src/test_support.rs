//! In-memory platform doubles shared by the unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::observer::{Observers, Subscription};
use crate::platform::{
    CameraLayout, Connectivity, HardwareError, HostUi, MediaStore, Permission,
    PermissionProvider, Platform, PreviewTorch, TorchDevice, Vibrator, WebViewHost,
};
use crate::protocol::{decode_script, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorchOp {
    Mode(bool),
    Strength(u32),
}

/// Torch that reports every change back through its mode observers
pub struct FakeTorch {
    max_level: Option<u32>,
    ops: Mutex<Vec<TorchOp>>,
    failure: Mutex<Option<String>>,
    observers: Observers<bool>,
}

impl FakeTorch {
    pub fn new(max_level: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            max_level,
            ops: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            observers: Observers::new(),
        })
    }

    pub fn ops(&self) -> Vec<TorchOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    fn apply(&self, op: TorchOp, on: bool) -> Result<(), HardwareError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(HardwareError::new(message));
        }
        self.ops.lock().unwrap().push(op);
        self.observers.notify(&on);
        Ok(())
    }
}

impl TorchDevice for FakeTorch {
    fn set_torch_mode(&self, on: bool) -> Result<(), HardwareError> {
        self.apply(TorchOp::Mode(on), on)
    }

    fn max_strength_level(&self) -> Option<u32> {
        self.max_level
    }

    fn set_strength_level(&self, level: u32) -> Result<(), HardwareError> {
        self.apply(TorchOp::Strength(level), true)
    }

    fn watch_torch_mode(&self, callback: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        self.observers.subscribe(move |on| callback(*on))
    }
}

#[derive(Default)]
pub struct FakePreview {
    ops: Mutex<Vec<bool>>,
}

impl FakePreview {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ops(&self) -> Vec<bool> {
        self.ops.lock().unwrap().clone()
    }
}

impl PreviewTorch for FakePreview {
    fn enable_torch(&self, on: bool) -> Result<(), HardwareError> {
        self.ops.lock().unwrap().push(on);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeVibrator {
    pub calls: Mutex<Vec<Duration>>,
}

impl Vibrator for FakeVibrator {
    fn vibrate(&self, duration: Duration) -> Result<(), HardwareError> {
        self.calls.lock().unwrap().push(duration);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMediaStore {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MediaStore for FakeMediaStore {
    fn save_media(&self, filename: &str, bytes: &[u8]) -> Result<(), HardwareError> {
        self.saved.lock().unwrap().push((filename.to_string(), bytes.to_vec()));
        Ok(())
    }
}

pub struct FakePermissions {
    pub api_level: u32,
    pub granted: Mutex<HashSet<Permission>>,
    pub requested: Mutex<Vec<(Permission, RequestId)>>,
}

impl FakePermissions {
    pub fn new(api_level: u32) -> Self {
        Self {
            api_level,
            granted: Mutex::new(HashSet::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn grant(&self, permission: Permission) {
        self.granted.lock().unwrap().insert(permission);
    }
}

impl PermissionProvider for FakePermissions {
    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn check(&self, permission: Permission) -> Result<bool, HardwareError> {
        Ok(self.granted.lock().unwrap().contains(&permission))
    }

    fn request(&self, permission: Permission, request_id: RequestId) -> Result<(), HardwareError> {
        self.requested.lock().unwrap().push((permission, request_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHost {
    pub cameras: Mutex<Vec<CameraLayout>>,
    pub timeline: Mutex<Vec<bool>>,
}

impl HostUi for FakeHost {
    fn show_camera(&self, layout: CameraLayout) {
        self.cameras.lock().unwrap().push(layout);
    }

    fn set_timeline_active(&self, active: bool) {
        self.timeline.lock().unwrap().push(active);
    }
}

pub struct FakeConnectivity {
    online: AtomicBool,
    observers: Observers<()>,
}

impl FakeConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self { online: AtomicBool::new(online), observers: Observers::new() })
    }

    /// Flip the network and fire the availability callbacks
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.observers.notify(&());
    }
}

impl Connectivity for FakeConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn watch_availability(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.observers.subscribe(move |_| callback())
    }
}

#[derive(Default)]
pub struct FakeWebView {
    pub loaded: Mutex<Vec<String>>,
}

impl WebViewHost for FakeWebView {
    fn load_url(&self, url: &str) {
        self.loaded.lock().unwrap().push(url.to_string());
    }
}

/// Every fake behind a [`Platform`], kept typed for assertions
pub struct FakePlatform {
    pub torch: Arc<FakeTorch>,
    pub vibrator: Arc<FakeVibrator>,
    pub media: Arc<FakeMediaStore>,
    pub permissions: Arc<FakePermissions>,
    pub host: Arc<FakeHost>,
}

impl FakePlatform {
    pub fn new(api_level: u32) -> Self {
        Self {
            torch: FakeTorch::new(Some(10)),
            vibrator: Arc::new(FakeVibrator::default()),
            media: Arc::new(FakeMediaStore::default()),
            permissions: Arc::new(FakePermissions::new(api_level)),
            host: Arc::new(FakeHost::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            torch: self.torch.clone(),
            vibrator: self.vibrator.clone(),
            media: self.media.clone(),
            permissions: self.permissions.clone(),
            host: self.host.clone(),
        }
    }
}

/// Wait for the next script delivered to the page and split it into
/// `(function, params)`
pub async fn next_script(rx: &mut mpsc::UnboundedReceiver<String>) -> (String, Value) {
    let script = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no script delivered in time")
        .expect("script channel closed");
    let (function, params) = decode_script(&script).expect("script is not a bridge call");
    (function.to_string(), params)
}
