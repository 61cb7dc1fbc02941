//! Device capabilities the bridge drives, expressed as traits.
//!
//! The host (an Android activity, the CLI, a test) implements these and hands
//! them to [`crate::CueBridge`] through a [`Platform`] bundle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observer::Subscription;
use crate::protocol::RequestId;

/// A failure reported by a platform API (camera access, vibrator, storage...)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HardwareError(pub String);

impl HardwareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The standalone camera-manager torch
pub trait TorchDevice: Send + Sync {
    fn set_torch_mode(&self, on: bool) -> Result<(), HardwareError>;

    /// Highest strength level supported, or `None` when strength control is unavailable
    fn max_strength_level(&self) -> Option<u32>;

    fn set_strength_level(&self, level: u32) -> Result<(), HardwareError>;

    /// Register for torch mode changes reported by the hardware
    fn watch_torch_mode(&self, callback: Box<dyn Fn(bool) + Send + Sync>) -> Subscription;
}

/// Torch control of a live camera preview; has no strength control
pub trait PreviewTorch: Send + Sync {
    fn enable_torch(&self, on: bool) -> Result<(), HardwareError>;
}

pub trait Vibrator: Send + Sync {
    fn vibrate(&self, duration: Duration) -> Result<(), HardwareError>;
}

/// The public media store (photo gallery)
pub trait MediaStore: Send + Sync {
    fn save_media(&self, filename: &str, bytes: &[u8]) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Microphone,
    Camera,
    SavePhoto,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Microphone => "microphone",
            Permission::Camera => "camera",
            Permission::SavePhoto => "save-photo",
        };
        f.write_str(name)
    }
}

pub trait PermissionProvider: Send + Sync {
    /// Platform API level, used for version-gated permission policy
    fn api_level(&self) -> u32;

    fn check(&self, permission: Permission) -> Result<bool, HardwareError>;

    /// Show the permission dialog. The host reports the outcome through
    /// [`crate::CueBridge::on_permission_result`] with the same request id.
    fn request(&self, permission: Permission, request_id: RequestId) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraLayout {
    Both,
    PhotoOnly,
    VideoOnly,
}

/// UI-side collaborators
pub trait HostUi: Send + Sync {
    fn show_camera(&self, _layout: CameraLayout) {}

    fn set_timeline_active(&self, _active: bool) {}
}

pub trait Connectivity: Send + Sync {
    /// Whether the active network has validated internet access
    fn is_online(&self) -> bool;

    /// Register for network available/lost callbacks
    fn watch_availability(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

/// The page-hosting web view
pub trait WebViewHost: Send + Sync {
    fn load_url(&self, url: &str);
}

/// Script evaluation inside the page; called from a single delivery context
pub trait ScriptHost: Send + Sync {
    fn evaluate_javascript(&self, script: &str);
}

/// Every device capability the bridge needs
#[derive(Clone)]
pub struct Platform {
    pub torch: Arc<dyn TorchDevice>,
    pub vibrator: Arc<dyn Vibrator>,
    pub media: Arc<dyn MediaStore>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub host: Arc<dyn HostUi>,
}
