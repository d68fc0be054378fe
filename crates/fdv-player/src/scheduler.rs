//! Playback trigger loop.
//!
//! One worker thread paces decode-and-deliver attempts at a fraction of the
//! sequence frame interval, so delivery polls faster than frames arrive and
//! is never starved. Commands travel over a channel and are drained between
//! ticks, which is what makes `stop` synchronous: the acknowledgment can
//! only be sent once any in-flight tick has finished.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::trace;

use fdv_bridge::{DecodeOutcome, DecoderSession, OutOfRangeMode};

use crate::player::PlayerEvent;
use crate::pool::FramePool;
use crate::stats::RateStats;

/// Poll-rate damping: the trigger interval is this fraction of the nominal
/// frame interval.
pub const TRIGGER_RATE_FACTOR: f32 = 0.3;

/// Floor for the derived interval, also used when the source reports an
/// unknown (zero) frame rate.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Trigger interval for a sequence frame rate. Never divides into a zero or
/// negative rate.
pub fn tick_interval(frame_rate: f32) -> Duration {
    if frame_rate > 0.0 {
        Duration::from_secs_f32(TRIGGER_RATE_FACTOR / frame_rate).max(MIN_TICK_INTERVAL)
    } else {
        MIN_TICK_INTERVAL
    }
}

pub(crate) type SharedSession = Arc<Mutex<Box<dyn DecoderSession>>>;

/// Everything one decode-and-deliver attempt touches. Cloned into the
/// trigger thread; the controller keeps its own clone for synchronous
/// deliveries (seek, preview).
#[derive(Clone)]
pub(crate) struct DeliveryState {
    pub session: SharedSession,
    pub pool: Arc<FramePool>,
    /// Transport flag; cleared by out-of-range policies Stop and Hide.
    pub playing: Arc<AtomicBool>,
    pub new_frame: Arc<AtomicBool>,
    /// Raised by the Hide policy; consumed by the presentation handoff.
    pub clear_requested: Arc<AtomicBool>,
    pub last_frame_id: Arc<AtomicI32>,
    pub compute_normals: Arc<AtomicBool>,
    pub vertex_capacity: usize,
    pub out_of_range_mode: Arc<Mutex<OutOfRangeMode>>,
    pub events: Sender<PlayerEvent>,
    pub stats: Arc<Mutex<RateStats>>,
    pub diagnostics: bool,
}

impl DeliveryState {
    /// One decode-and-deliver attempt. Never re-entered concurrently with
    /// itself: the session lock is held across the decode and the
    /// out-of-range check. Returns whether transport is still playing.
    pub(crate) fn run(&self) -> bool {
        let mut session = self.session.lock();
        let last = self.last_frame_id.load(Ordering::SeqCst);

        let outcome = {
            let mut slot = self.pool.write_slot();
            if self.compute_normals.load(Ordering::SeqCst) {
                slot.ensure_normals(self.vertex_capacity);
            }
            let outcome = session.decode_frame(slot.buffers_mut(), last);
            if let DecodeOutcome::NewFrame {
                frame_id,
                vertex_count,
                triangle_count,
            } = outcome
            {
                slot.frame_id = frame_id;
                slot.vertex_count = vertex_count;
                slot.triangle_count = triangle_count;
            }
            outcome
        };

        match outcome {
            DecodeOutcome::NewFrame { frame_id, .. } if frame_id != last => {
                self.pool.commit();
                self.last_frame_id.store(frame_id, Ordering::SeqCst);
                self.new_frame.store(true, Ordering::SeqCst);
                if self.diagnostics {
                    self.stats.lock().record_decode();
                }
                trace!(frame_id, "delivered frame");
            }
            // Same id or no new frame: slots and last-delivered id stay put.
            _ => {}
        }

        if session.out_of_range_event() {
            let _ = self.events.send(PlayerEvent::OutOfRange);
            match *self.out_of_range_mode.lock() {
                OutOfRangeMode::Stop => {
                    session.set_playing(false);
                    self.playing.store(false, Ordering::SeqCst);
                }
                OutOfRangeMode::Hide => {
                    session.set_playing(false);
                    self.playing.store(false, Ordering::SeqCst);
                    self.clear_requested.store(true, Ordering::SeqCst);
                }
                OutOfRangeMode::Loop | OutOfRangeMode::Reverse => {}
            }
        }

        self.playing.load(Ordering::SeqCst)
    }
}

enum TickerCmd {
    Play,
    Stop(Sender<()>),
    Shutdown,
}

/// Owns the trigger thread. `stop` blocks until the current tick (if any)
/// has completed; `shutdown` additionally joins the thread.
pub(crate) struct SequenceTicker {
    cmd_tx: Sender<TickerCmd>,
    handle: Option<JoinHandle<()>>,
}

impl SequenceTicker {
    pub(crate) fn spawn(interval: Duration, delivery: DeliveryState) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let handle = thread::spawn(move || run_loop(interval, &delivery, &cmd_rx));
        SequenceTicker {
            cmd_tx,
            handle: Some(handle),
        }
    }

    pub(crate) fn start(&self) {
        let _ = self.cmd_tx.send(TickerCmd::Play);
    }

    pub(crate) fn stop(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.cmd_tx.send(TickerCmd::Stop(ack_tx)).is_ok() {
            // Acknowledged only between ticks, so no delivery attempt is
            // still pending once this returns.
            let _ = ack_rx.recv();
        }
    }

    pub(crate) fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(TickerCmd::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SequenceTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(interval: Duration, delivery: &DeliveryState, cmd_rx: &Receiver<TickerCmd>) {
    let mut ticking = false;
    loop {
        let cmd = if ticking {
            match cmd_rx.recv_timeout(interval) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };
        match cmd {
            Some(TickerCmd::Play) => {
                ticking = true;
                continue;
            }
            Some(TickerCmd::Stop(ack)) => {
                ticking = false;
                let _ = ack.send(());
                continue;
            }
            Some(TickerCmd::Shutdown) => break,
            None => {}
        }
        if ticking && !delivery.run() {
            // Out-of-range policy stopped the transport.
            ticking = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_fraction_of_frame_interval() {
        // 30 fps -> 0.3 / 30 = 10ms
        assert!((tick_interval(30.0).as_secs_f32() - 0.010).abs() < 1e-4);
        assert!((tick_interval(15.0).as_secs_f32() - 0.020).abs() < 1e-4);
    }

    #[test]
    fn zero_or_negative_rate_clamps_to_minimum() {
        assert_eq!(tick_interval(0.0), MIN_TICK_INTERVAL);
        assert_eq!(tick_interval(-24.0), MIN_TICK_INTERVAL);
    }

    #[test]
    fn very_high_rate_never_drops_below_minimum() {
        assert!(tick_interval(1_000_000.0) >= MIN_TICK_INTERVAL);
    }
}
