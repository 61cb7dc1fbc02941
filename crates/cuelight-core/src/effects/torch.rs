//! Torch on/off and strength control

use std::sync::{Arc, RwLock};

use log::debug;
use tokio::sync::watch;

use crate::observer::Subscription;
use crate::platform::{HardwareError, PreviewTorch, TorchDevice};

/// Lowest intensity sent during envelopes; the hardware rejects zero
pub const MIN_INTENSITY: f32 = 0.001;
pub const MAX_INTENSITY: f32 = 1.0;

/// Clamp an envelope intensity into `[MIN_INTENSITY, MAX_INTENSITY]`
pub fn clamp_intensity(level: f32) -> f32 {
    if level.is_nan() {
        return MIN_INTENSITY;
    }
    level.clamp(MIN_INTENSITY, MAX_INTENSITY)
}

/// Map a normalized level onto the device's integer strength scale
pub fn strength_level(level: f32, max_level: u32) -> u32 {
    (max_level as f32 * level.clamp(0.0, 1.0)).round() as u32
}

pub struct TorchController {
    device: Arc<dyn TorchDevice>,
    preview: RwLock<Option<Arc<dyn PreviewTorch>>>,
    state: Arc<watch::Sender<bool>>,
    _subscription: Subscription,
}

impl TorchController {
    pub fn new(device: Arc<dyn TorchDevice>) -> Self {
        let (state, _) = watch::channel(false);
        let state = Arc::new(state);

        // The hardware callback is the only writer of the torch state
        let publisher = Arc::clone(&state);
        let subscription = device.watch_torch_mode(Box::new(move |enabled| {
            publisher.send_replace(enabled);
        }));

        Self {
            device,
            preview: RwLock::new(None),
            state,
            _subscription: subscription,
        }
    }

    /// Last torch state reported by the hardware callback
    pub fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    /// Prefer the live camera preview's torch while it is open
    pub fn set_preview(&self, preview: Option<Arc<dyn PreviewTorch>>) {
        debug!("[Flash] Preview torch {}", if preview.is_some() { "attached" } else { "detached" });
        *self.preview.write().unwrap_or_else(|e| e.into_inner()) = preview;
    }

    fn preview(&self) -> Option<Arc<dyn PreviewTorch>> {
        self.preview.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn turn_torch(&self, on: bool) -> Result<(), HardwareError> {
        if let Some(preview) = self.preview() {
            return preview.enable_torch(on);
        }
        self.device
            .set_torch_mode(on)
            .map_err(|e| HardwareError::new(format!("Method turnTorch - Camera access denied: {e}")))
    }

    /// Light the torch at a normalized level, falling back to plain on when
    /// the device has no strength control
    pub fn turn_torch_to_level(&self, level: f32) -> Result<(), HardwareError> {
        // The preview torch has no strength control
        if let Some(preview) = self.preview() {
            return preview.enable_torch(true);
        }

        match self.device.max_strength_level() {
            Some(max_level) if max_level > 1 => {
                let strength = strength_level(level, max_level);
                // A zero strength would switch the torch off; keep the previous state
                if strength > 0 {
                    self.device.set_strength_level(strength).map_err(|e| {
                        HardwareError::new(format!(
                            "Method turnTorchToLevel - Camera access denied: {e}"
                        ))
                    })?;
                }
                Ok(())
            }
            _ => self.turn_torch(true),
        }
    }
}
