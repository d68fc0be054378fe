//! End-to-end playback over the synthetic decoder backend: a real trigger
//! thread, the shared buffer pool, and the presentation handoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use fdv_player::{
    MeshFrame, OutOfRangeMode, Player, PlayerConfig, PlayerEvent, PresentationSpec,
    PresentationTarget, Source, StubConfig, StubSession,
};

#[derive(Default)]
struct Uploads {
    frame_ids: Vec<i32>,
    clears: usize,
    released: bool,
}

#[derive(Clone, Default)]
struct SharedTarget(Arc<Mutex<Uploads>>);

impl PresentationTarget for SharedTarget {
    fn allocate(&mut self, _spec: &PresentationSpec) {}

    fn upload(&mut self, _buffer_index: usize, frame: &MeshFrame<'_>) {
        self.0.lock().frame_ids.push(frame.frame_id);
    }

    fn clear_mesh(&mut self) {
        self.0.lock().clears += 1;
    }

    fn release(&mut self) {
        self.0.lock().released = true;
    }
}

fn stub_source(config: StubConfig) -> Source {
    Source::new(Box::new(StubSession::new(config)))
}

/// Drive `update` until the predicate holds or the deadline passes.
fn pump_until(player: &mut Player, deadline: Duration, mut done: impl FnMut(&Player) -> bool) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        player.update();
        if done(player) {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn plays_through_and_stops_at_the_end_of_the_range() {
    let target = SharedTarget::default();
    let mut player = Player::new(
        PlayerConfig {
            auto_play: true,
            out_of_range_mode: OutOfRangeMode::Stop,
            ..PlayerConfig::default()
        },
        Box::new(target.clone()),
    );
    player
        .initialize_with(stub_source(StubConfig {
            frame_count: 8,
            frame_rate: 120.0,
            ..StubConfig::default()
        }))
        .unwrap();
    player
        .session_info()
        .map(|info| assert_eq!(info.frame_count, 8));
    assert!(player.is_playing());

    // Generous deadline; the trigger interval is a few milliseconds.
    pump_until(&mut player, Duration::from_secs(10), |p| !p.is_playing());

    assert!(!player.is_playing());
    // One more handoff pass in case the final frame landed after the last
    // update call.
    player.update();
    assert_eq!(player.current_frame(), 7);

    let events: Vec<PlayerEvent> = player.events().try_iter().collect();
    assert!(events.contains(&PlayerEvent::OutOfRange));
    assert!(events.contains(&PlayerEvent::NewModel));

    let uploads = target.0.lock();
    assert_eq!(uploads.frame_ids.last(), Some(&7));
    // Frame ids are delivered in order even when handoffs skip frames.
    assert!(uploads.frame_ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn loop_mode_wraps_and_keeps_playing() {
    let target = SharedTarget::default();
    let mut player = Player::new(
        PlayerConfig {
            auto_play: true,
            out_of_range_mode: OutOfRangeMode::Loop,
            ..PlayerConfig::default()
        },
        Box::new(target.clone()),
    );
    player
        .initialize_with(stub_source(StubConfig {
            frame_count: 4,
            frame_rate: 240.0,
            ..StubConfig::default()
        }))
        .unwrap();

    let mut seen = Vec::new();
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(10) {
        player.update();
        seen.extend(player.events().try_iter());
        if seen.contains(&PlayerEvent::OutOfRange) {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    assert!(player.is_playing());
    assert!(seen.contains(&PlayerEvent::OutOfRange));
    player.uninitialize();
    assert!(target.0.lock().released);
}

#[test]
fn seek_while_stopped_delivers_exactly_that_frame() {
    let target = SharedTarget::default();
    let mut player = Player::new(
        PlayerConfig {
            auto_play: false,
            ..PlayerConfig::default()
        },
        Box::new(target.clone()),
    );
    player
        .initialize_with(stub_source(StubConfig {
            frame_count: 60,
            ..StubConfig::default()
        }))
        .unwrap();
    assert!(!player.is_playing());

    player.goto_frame(42).unwrap();
    player.update();

    assert_eq!(player.current_frame(), 42);
    assert_eq!(target.0.lock().frame_ids.as_slice(), &[42]);
}

#[test]
fn stop_is_synchronous_and_leaves_no_pending_delivery() {
    let target = SharedTarget::default();
    let mut player = Player::new(
        PlayerConfig {
            auto_play: true,
            ..PlayerConfig::default()
        },
        Box::new(target.clone()),
    );
    player
        .initialize_with(stub_source(StubConfig {
            frame_count: 1000,
            frame_rate: 240.0,
            ..StubConfig::default()
        }))
        .unwrap();

    pump_until(&mut player, Duration::from_secs(10), |p| {
        p.current_frame() > 0
    });
    player.play(false);
    let frozen = player.current_frame();

    // No trigger is running anymore; the position must not move.
    std::thread::sleep(Duration::from_millis(50));
    player.update();
    assert_eq!(player.current_frame(), frozen);
    assert!(!player.is_playing());

    // Resuming picks up where transport paused.
    player.play(true);
    pump_until(&mut player, Duration::from_secs(10), |p| {
        p.current_frame() > frozen
    });
    assert!(player.current_frame() > frozen);
}

#[test]
fn diagnostics_counts_deliveries_and_handoffs() {
    let target = SharedTarget::default();
    let mut player = Player::new(
        PlayerConfig {
            auto_play: true,
            diagnostics: true,
            ..PlayerConfig::default()
        },
        Box::new(target.clone()),
    );
    player
        .initialize_with(stub_source(StubConfig {
            frame_count: 1000,
            frame_rate: 240.0,
            ..StubConfig::default()
        }))
        .unwrap();

    pump_until(&mut player, Duration::from_secs(10), |p| {
        p.stats().presented_frames >= 3
    });
    let stats = player.stats();
    assert!(stats.delivered_frames >= 3);
    assert!(stats.presented_frames >= 3);
    // Presentation can only consume what was delivered.
    assert!(stats.presented_frames <= stats.delivered_frames);
}
