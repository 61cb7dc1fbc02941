//! Timed flash patterns.
//!
//! Each effect runs as its own task holding a cancellation token (a child of
//! the bridge's shutdown token) and a wall-clock deadline. Whatever ends the
//! session (deadline, natural completion, preemption by a newer effect, or
//! shutdown), the torch is forced off and the session reports exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::torch::{clamp_intensity, TorchController};
use crate::platform::HardwareError;
use crate::protocol::Envelope;

type ActiveSession = Option<(u64, CancellationToken)>;

/// A running flash effect
pub struct FlashSession {
    handle: JoinHandle<Result<(), HardwareError>>,
}

impl FlashSession {
    /// Wait for the session to end; returns the first hardware failure, if any
    pub async fn finished(self) -> Result<(), HardwareError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(HardwareError::new(format!("Flash effect aborted: {e}"))),
        }
    }
}

pub struct FlashEffects {
    torch: Arc<TorchController>,
    blink_interval: Duration,
    shutdown: CancellationToken,
    next_id: AtomicU64,
    active: Arc<Mutex<ActiveSession>>,
}

impl FlashEffects {
    pub fn new(torch: Arc<TorchController>, blink_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            torch,
            blink_interval,
            shutdown,
            next_id: AtomicU64::new(0),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a new session, cancelling the one still running
    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace((id, token.clone()));
        if let Some((previous_id, previous)) = previous {
            debug!("[Flash] Session {} preempted by {}", previous_id, id);
            previous.cancel();
        }
        (id, token)
    }

    /// Blink the torch every blink interval until `duration` has elapsed
    pub fn sparkle(&self, duration: Duration) -> FlashSession {
        let (id, token) = self.begin();
        let torch = Arc::clone(&self.torch);
        let active = Arc::clone(&self.active);
        let blink = self.blink_interval;
        let deadline = Instant::now() + duration;

        let handle = tokio::spawn(async move {
            let mut failure = None;
            let mut on = false;
            loop {
                on = !on;
                record(&mut failure, torch.turn_torch(on));
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep_until(deadline) => break,
                    _ = sleep(blink) => {}
                }
            }
            finish(id, &torch, &active, failure)
        });

        FlashSession { handle }
    }

    /// Drive the torch through a ramp-up / sustain / ramp-down envelope
    pub fn advanced_sparkle(&self, envelope: Envelope) -> FlashSession {
        let (id, token) = self.begin();
        let torch = Arc::clone(&self.torch);
        let active = Arc::clone(&self.active);
        let blink = self.blink_interval;
        let deadline = Instant::now() + envelope.total();

        let handle = tokio::spawn(async move {
            let mut failure = None;
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[Flash] Session {} cancelled", id);
                }
                _ = sleep_until(deadline) => {
                    debug!("[Flash] Session {} interrupted by time: {:?}", id, envelope.total());
                }
                _ = run_envelope(&torch, envelope, blink, &mut failure) => {}
            }
            finish(id, &torch, &active, failure)
        });

        FlashSession { handle }
    }

    /// Whether an effect session is currently running
    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

async fn run_envelope(
    torch: &TorchController,
    envelope: Envelope,
    blink: Duration,
    failure: &mut Option<HardwareError>,
) {
    let peak = clamp_intensity(envelope.intensity);

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= envelope.ramp_up {
            break;
        }
        let level = elapsed.as_secs_f32() / envelope.ramp_up.as_secs_f32() * peak;
        record(failure, torch.turn_torch_to_level(clamp_intensity(level)));
        sleep(blink).await;
    }

    if !envelope.sustain.is_zero() {
        record(failure, torch.turn_torch_to_level(peak));
        sleep(envelope.sustain).await;
    }

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= envelope.ramp_down {
            break;
        }
        let level = (1.0 - elapsed.as_secs_f32() / envelope.ramp_down.as_secs_f32()) * peak;
        record(failure, torch.turn_torch_to_level(clamp_intensity(level)));
        sleep(blink).await;
    }
}

fn record(failure: &mut Option<HardwareError>, result: Result<(), HardwareError>) {
    if let Err(e) = result {
        error!("[Flash] {}", e);
        failure.get_or_insert(e);
    }
}

fn finish(
    id: u64,
    torch: &TorchController,
    active: &Mutex<ActiveSession>,
    mut failure: Option<HardwareError>,
) -> Result<(), HardwareError> {
    record(&mut failure, torch.turn_torch(false));

    let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
    if active.as_ref().is_some_and(|(active_id, _)| *active_id == id) {
        *active = None;
    }

    failure.map_or(Ok(()), Err)
}
