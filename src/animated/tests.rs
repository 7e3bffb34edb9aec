// SPDX-License-Identifier: MPL-2.0

//! Scenario tests for animated playback.

use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use cosmic_anim_config::PlayerConfig;
use proptest::prelude::*;

use super::testing::{Recorder, StampedDecoder, gif_bytes, solid_frame, stamp, wait_until};
use super::*;
use crate::error::{ConstructionError, DecodeError};

const MS: Duration = Duration::from_millis(1);

fn paused_config() -> PlayerConfig {
    PlayerConfig::default().autoplay(false)
}

#[test]
fn test_three_frames_in_250ms() {
    let recorder = Recorder::default();
    let spawned = Instant::now();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(3, 100 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    let store = player.frame_store();

    thread::sleep(250 * MS);
    player.shutdown();

    let frames = recorder.frames();
    assert!((2..=3).contains(&frames.len()), "got {} frames", frames.len());
    let first = frames[0].0.duration_since(spawned);
    assert!(first < 30 * MS, "first frame after {first:?}");
    let indices: Vec<usize> = frames.iter().map(|&(_, _, index)| index).collect();
    assert_eq!(&indices[..2], &[0, 1]);

    // Nothing was consumed, so the last published frame is still there, once.
    let last_sequence = frames[frames.len() - 1].1;
    assert_eq!(store.try_consume().unwrap().sequence, last_sequence);
    assert!(store.try_consume().is_none());
}

#[test]
fn test_dispose_interrupts_frame_delay() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(2, Duration::from_secs(10)),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || !recorder.frames().is_empty()));

    let store = player.frame_store();
    let start = Instant::now();
    player.shutdown();
    assert!(start.elapsed() < Duration::from_millis(500), "took {:?}", start.elapsed());
    assert!(store.is_closed());
}

#[test]
fn test_dispose_during_decode_drops_the_frame() {
    let recorder = Recorder::default();
    let decoder = StampedDecoder::uniform(2, 50 * MS).latency(200 * MS);
    let decoded = decoder.decoded();
    let player = AnimatedPlayer::spawn(decoder, recorder.sink(), &PlayerConfig::default()).unwrap();
    let store = player.frame_store();

    thread::sleep(50 * MS);
    assert_eq!(decoded.load(Ordering::SeqCst), 0);
    assert_eq!(player.dispose(), Delivery::Queued);
    player.shutdown();

    assert_eq!(decoded.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().published, 0);
    assert!(recorder.frames().is_empty());
    assert!(store.try_consume().is_none());
}

#[test]
fn test_play_while_running_keeps_cadence() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(4, 50 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(1), || !recorder.frames().is_empty()));

    assert_eq!(player.play(), Delivery::Queued);
    assert_eq!(player.play(), Delivery::Queued);
    thread::sleep(180 * MS);
    player.shutdown();
    let stopped = Instant::now();

    let frames = recorder.frames();
    let elapsed = stopped.duration_since(frames[0].0);
    for pair in frames.windows(2) {
        let gap = pair[1].0.duration_since(pair[0].0);
        assert!(gap >= 40 * MS, "frames {} and {} only {gap:?} apart", pair[0].1, pair[1].1);
        assert_eq!(pair[1].1, pair[0].1 + 1);
    }
    let allowed = (elapsed.as_millis() / 50) as usize + 1;
    assert!(frames.len() <= allowed, "{} frames in {elapsed:?}", frames.len());
    assert_eq!(
        recorder.transitions(),
        vec![
            (WorkerState::Idle, WorkerState::Running),
            (WorkerState::Running, WorkerState::Disposed),
        ]
    );
}

#[test]
fn test_closed_store_disposes_worker() {
    let recorder = Recorder::default();
    let decoder = StampedDecoder::uniform(3, 20 * MS);
    let decoded = decoder.decoded();
    let player = AnimatedPlayer::spawn(decoder, recorder.sink(), &PlayerConfig::default()).unwrap();
    assert!(wait_until(Duration::from_secs(1), || !recorder.frames().is_empty()));

    player.frame_store().close();
    assert!(wait_until(Duration::from_secs(1), || player.state() == WorkerState::Disposed));
    assert!(wait_until(Duration::from_secs(1), || player.is_finished()));

    let decodes = decoded.load(Ordering::SeqCst);
    thread::sleep(100 * MS);
    assert_eq!(decoded.load(Ordering::SeqCst), decodes);
    assert_eq!(
        recorder.transitions().last(),
        Some(&(WorkerState::Running, WorkerState::Disposed))
    );
}

#[test]
fn test_no_frames_after_dispose() {
    let recorder = Recorder::default();
    let decoder = StampedDecoder::uniform(3, 20 * MS);
    let decoded = decoder.decoded();
    let player = AnimatedPlayer::spawn(decoder, recorder.sink(), &PlayerConfig::default()).unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.frames().len() >= 3));

    let store = player.frame_store();
    player.shutdown();
    let frames = recorder.frames().len();
    let decodes = decoded.load(Ordering::SeqCst);

    thread::sleep(100 * MS);
    assert_eq!(recorder.frames().len(), frames);
    assert_eq!(decoded.load(Ordering::SeqCst), decodes);
    assert_eq!(store.stats().published, frames as u64);
}

#[test]
fn test_repeated_commands_are_idempotent() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(2, 50 * MS),
        recorder.sink(),
        &paused_config(),
    )
    .unwrap();
    assert_eq!(player.state(), WorkerState::Idle);

    assert_eq!(player.play(), Delivery::Queued);
    assert_eq!(player.play(), Delivery::Queued);
    assert!(wait_until(Duration::from_secs(1), || player.state() == WorkerState::Running));

    assert_eq!(player.dispose(), Delivery::Queued);
    assert_eq!(player.dispose(), Delivery::Ignored);
    assert_eq!(player.play(), Delivery::Ignored);
    assert!(wait_until(Duration::from_secs(1), || player.is_finished()));
    assert_eq!(player.state(), WorkerState::Disposed);
    drop(player);

    assert_eq!(
        recorder.transitions(),
        vec![
            (WorkerState::Idle, WorkerState::Running),
            (WorkerState::Running, WorkerState::Disposed),
        ]
    );
}

#[test]
fn test_consumed_frames_are_whole_and_in_order() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(5, 20 * MS).latency(3 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    let store = player.frame_store();

    let mut last_sequence = 0;
    let mut seen = 0;
    let until = Instant::now() + Duration::from_millis(400);
    while Instant::now() < until {
        if let Some(frame) = store.try_consume() {
            let expected = stamp(frame.index);
            assert!(frame.pixels.iter().all(|&b| b == expected), "torn frame {frame:?}");
            assert!(frame.sequence > last_sequence);
            last_sequence = frame.sequence;
            seen += 1;
        }
        thread::sleep(MS);
    }
    player.shutdown();
    assert!(seen >= 5, "only consumed {seen} frames");
}

#[test]
fn test_frame_pacing_accounts_for_decode_time() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(4, 50 * MS).latency(10 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(3), || recorder.frames().len() >= 9));
    player.shutdown();

    let frames = recorder.frames();
    let span = frames[8].0.duration_since(frames[0].0);
    // Eight intervals of 50ms, decode time included in each.
    assert!(span >= 380 * MS, "too fast: {span:?}");
    assert!(span < 600 * MS, "too slow: {span:?}");
}

#[test]
fn test_pause_holds_frame_and_play_resumes() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(3, 30 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(1), || recorder.frames().len() >= 2));

    player.pause();
    assert!(wait_until(Duration::from_secs(1), || player.state() == WorkerState::Paused));
    let held = recorder.frames().len();
    thread::sleep(150 * MS);
    assert_eq!(recorder.frames().len(), held);

    player.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.frames().len() > held));
    player.shutdown();

    let sequences: Vec<u64> = recorder.frames().iter().map(|&(_, sequence, _)| sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
}

#[test]
fn test_non_seekable_source_is_rejected() {
    let recorder = Recorder::default();
    let result = AnimatedPlayer::spawn(
        StampedDecoder::uniform(2, 20 * MS).not_seekable(),
        recorder.sink(),
        &PlayerConfig::default(),
    );
    assert!(matches!(result, Err(ConstructionError::NotSeekable)));
    assert!(recorder.events().is_empty());

    let bytes = gif_bytes(2, 2, None, &[solid_frame(2, 2, [1, 2, 3], 2)]);
    let decoder = GifDecoder::new(super::testing::NonSeekable(Cursor::new(bytes)));
    let result = AnimatedPlayer::spawn(decoder, recorder.sink(), &PlayerConfig::default());
    assert!(matches!(result, Err(ConstructionError::NotSeekable)));
}

#[test]
fn test_decode_error_disposes_and_reports_once() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(5, 20 * MS).fail_after(2),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || player.is_finished()));
    assert_eq!(player.state(), WorkerState::Disposed);
    assert!(player.frame_store().is_closed());

    // Further commands change nothing.
    player.play();
    drop(player);

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], DecodeError::Malformed(_)));
    assert_eq!(recorder.frames().len(), 2);
    assert_eq!(
        recorder.transitions().last(),
        Some(&(WorkerState::Running, WorkerState::Disposed))
    );
}

#[test]
fn test_loop_count_honored_when_configured() {
    let recorder = Recorder::default();
    let config = PlayerConfig::default().honor_loop_count(true);
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(2, 20 * MS).loop_policy(LoopPolicy::Finite(2)),
        recorder.sink(),
        &config,
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        recorder.transitions().contains(&(WorkerState::Running, WorkerState::Idle))
    }));
    thread::sleep(60 * MS);
    assert_eq!(recorder.frames().len(), 4);
    assert_eq!(player.state(), WorkerState::Idle);

    // Play after the last loop starts over.
    player.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.frames().len() > 4));
    player.shutdown();
    assert_eq!(recorder.frames()[4].2, 0);
}

#[test]
fn test_loop_count_ignored_by_default() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(2, 20 * MS).loop_policy(LoopPolicy::Finite(1)),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.frames().len() >= 6));
    assert_eq!(player.state(), WorkerState::Running);
    player.shutdown();

    let indices: Vec<usize> = recorder.frames().iter().map(|&(_, _, index)| index).collect();
    assert_eq!(&indices[..6], &[0, 1, 0, 1, 0, 1]);
}

#[test]
fn test_still_image_is_published_once() {
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        StampedDecoder::uniform(1, 20 * MS),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    thread::sleep(150 * MS);
    assert_eq!(recorder.frames().len(), 1);
    assert_eq!(player.state(), WorkerState::Running);
    player.shutdown();
}

#[test]
fn test_drop_joins_worker() {
    let decoder = StampedDecoder::uniform(2, 20 * MS);
    let decoded = decoder.decoded();
    let player = AnimatedPlayer::spawn(decoder, |_: PlayerEvent| {}, &PlayerConfig::default()).unwrap();
    assert!(wait_until(Duration::from_secs(1), || decoded.load(Ordering::SeqCst) > 0));

    drop(player);
    let after_drop = decoded.load(Ordering::SeqCst);
    thread::sleep(80 * MS);
    assert_eq!(decoded.load(Ordering::SeqCst), after_drop);
}

#[test]
fn test_gif_plays_through_player() {
    let bytes = gif_bytes(
        2,
        2,
        None,
        &[
            solid_frame(2, 2, [255, 0, 0], 2),
            solid_frame(2, 2, [0, 0, 255], 2),
        ],
    );
    let recorder = Recorder::default();
    let player = AnimatedPlayer::spawn(
        GifDecoder::new(Cursor::new(bytes)),
        recorder.sink(),
        &PlayerConfig::default(),
    )
    .unwrap();
    assert_eq!(player.header().frame_count, 2);

    let store = player.frame_store();
    let mut colors = Vec::new();
    assert!(wait_until(Duration::from_secs(2), || {
        if let Some(frame) = store.try_consume() {
            colors.push(frame.pixels[..4].to_vec());
        }
        colors.len() >= 2
    }));
    player.shutdown();

    // BGRA
    assert!(colors.contains(&vec![0, 0, 255, 255]));
    assert!(colors.contains(&vec![255, 0, 0, 255]));
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Play,
    Pause,
    Sleep(u8),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Play),
        Just(Action::Pause),
        (1u8..15).prop_map(Action::Sleep),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_state_changes_form_a_legal_path(actions in prop::collection::vec(action(), 0..12)) {
        let recorder = Recorder::default();
        let player = AnimatedPlayer::spawn(
            StampedDecoder::uniform(3, 20 * MS),
            recorder.sink(),
            &paused_config(),
        )
        .unwrap();

        for action in actions {
            match action {
                Action::Play => { player.play(); }
                Action::Pause => { player.pause(); }
                Action::Sleep(ms) => thread::sleep(u32::from(ms) * MS),
            }
        }
        player.shutdown();

        let transitions = recorder.transitions();
        prop_assert_eq!(transitions.first().map(|t| t.0), Some(WorkerState::Idle));
        prop_assert_eq!(transitions.last().map(|t| t.1), Some(WorkerState::Disposed));
        for &(from, to) in &transitions {
            prop_assert!(from.can_transition_to(to), "{} -> {}", from, to);
        }
        for pair in transitions.windows(2) {
            prop_assert_eq!(pair[0].1, pair[1].0);
        }

        let sequences: Vec<u64> = recorder.frames().iter().map(|&(_, sequence, _)| sequence).collect();
        prop_assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
