//! A platform that acts out device calls on the console

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cuelight_core::platform::{
    CameraLayout, HostUi, MediaStore, Permission, PermissionProvider, TorchDevice, Vibrator,
};
use cuelight_core::protocol::RequestId;
use cuelight_core::{HardwareError, Observers, Platform, Subscription};
use log::info;

/// Strength levels reported by the console torch
const CONSOLE_TORCH_LEVELS: u32 = 10;
/// Reported platform API level; new enough that save-photo needs no prompt
const CONSOLE_API_LEVEL: u32 = 34;

/// Reports every change back like a hardware torch callback would
#[derive(Default)]
struct ConsoleTorch {
    observers: Observers<bool>,
}

impl ConsoleTorch {
    fn publish(&self, on: bool) {
        self.observers.notify(&on);
    }
}

impl TorchDevice for ConsoleTorch {
    fn set_torch_mode(&self, on: bool) -> Result<(), HardwareError> {
        info!("[Torch] {}", if on { "on" } else { "off" });
        self.publish(on);
        Ok(())
    }

    fn max_strength_level(&self) -> Option<u32> {
        Some(CONSOLE_TORCH_LEVELS)
    }

    fn set_strength_level(&self, level: u32) -> Result<(), HardwareError> {
        info!("[Torch] strength {}/{}", level, CONSOLE_TORCH_LEVELS);
        self.publish(true);
        Ok(())
    }

    fn watch_torch_mode(&self, callback: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        self.observers.subscribe(move |on| callback(*on))
    }
}

struct ConsoleVibrator;

impl Vibrator for ConsoleVibrator {
    fn vibrate(&self, duration: Duration) -> Result<(), HardwareError> {
        info!("[Vibration] {} ms", duration.as_millis());
        Ok(())
    }
}

/// Saves media into a local directory
struct DirectoryMediaStore {
    dir: PathBuf,
}

impl MediaStore for DirectoryMediaStore {
    fn save_media(&self, filename: &str, bytes: &[u8]) -> Result<(), HardwareError> {
        let name = std::path::Path::new(filename)
            .file_name()
            .ok_or_else(|| HardwareError::new(format!("Invalid file name: {filename}")))?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| HardwareError::new(format!("Failed to save {}: {e}", path.display())))?;
        info!("[Media] Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Every permission is already granted on a desktop
struct GrantAll;

impl PermissionProvider for GrantAll {
    fn api_level(&self) -> u32 {
        CONSOLE_API_LEVEL
    }

    fn check(&self, _permission: Permission) -> Result<bool, HardwareError> {
        Ok(true)
    }

    fn request(&self, permission: Permission, _request_id: RequestId) -> Result<(), HardwareError> {
        Err(HardwareError::new(format!("No permission dialog for {permission}")))
    }
}

struct ConsoleHost;

impl HostUi for ConsoleHost {
    fn show_camera(&self, layout: CameraLayout) {
        info!("[Camera] Showing camera ({:?})", layout);
    }

    fn set_timeline_active(&self, active: bool) {
        info!("[Timeline] {}", if active { "started" } else { "stopped" });
    }
}

pub fn platform(media_dir: PathBuf) -> Platform {
    Platform {
        torch: Arc::new(ConsoleTorch::default()),
        vibrator: Arc::new(ConsoleVibrator),
        media: Arc::new(DirectoryMediaStore { dir: media_dir }),
        permissions: Arc::new(GrantAll),
        host: Arc::new(ConsoleHost),
    }
}
