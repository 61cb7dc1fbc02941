//! Hardware effect engine: torch control and timed flash patterns

pub mod flash;
pub mod torch;

pub use flash::{FlashEffects, FlashSession};
pub use torch::{clamp_intensity, strength_level, TorchController, MAX_INTENSITY, MIN_INTENSITY};
