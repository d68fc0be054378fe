//! Decode/update rate telemetry, sampled over half-second windows.

use std::time::Instant;

use serde::Serialize;

const WINDOW_MS: u128 = 500;

/// Snapshot handed to HUD-style consumers.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct PlaybackStats {
    /// Frames delivered by the decoder per second.
    pub decode_fps: f32,
    /// Frames handed to the presentation layer per second.
    pub update_fps: f32,
    pub delivered_frames: u64,
    pub presented_frames: u64,
}

#[derive(Debug, Default)]
struct RateWindow {
    window_start: Option<Instant>,
    events: u32,
    fps: f32,
}

impl RateWindow {
    fn record(&mut self) {
        let now = Instant::now();
        let start = *self.window_start.get_or_insert(now);
        self.events += 1;
        let elapsed = now.duration_since(start).as_millis();
        if elapsed >= WINDOW_MS {
            self.fps = self.events as f32 / elapsed as f32 * 1000.0;
            self.window_start = Some(now);
            self.events = 0;
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RateStats {
    decode: RateWindow,
    update: RateWindow,
    delivered: u64,
    presented: u64,
}

impl RateStats {
    pub(crate) fn record_decode(&mut self) {
        self.delivered += 1;
        self.decode.record();
    }

    pub(crate) fn record_update(&mut self) {
        self.presented += 1;
        self.update.record();
    }

    pub(crate) fn snapshot(&self) -> PlaybackStats {
        PlaybackStats {
            decode_fps: self.decode.fps,
            update_fps: self.update.fps,
            delivered_frames: self.delivered,
            presented_frames: self.presented,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_every_event() {
        let mut stats = RateStats::default();
        for _ in 0..3 {
            stats.record_decode();
        }
        stats.record_update();
        let snap = stats.snapshot();
        assert_eq!(snap.delivered_frames, 3);
        assert_eq!(snap.presented_frames, 1);
    }
}
