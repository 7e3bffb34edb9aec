// SPDX-License-Identifier: MPL-2.0

//! Test doubles: a stamped synthetic decoder, GIF fixtures, event recording.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::decoder::{DecodeStep, FrameDecoder};
use super::events::PlayerEvent;
use super::types::{AnimationHeader, LoopPolicy};
use crate::error::DecodeError;

/// Byte every pixel of frame `index` is filled with.
pub(crate) fn stamp(index: usize) -> u8 {
    (index % 250) as u8 + 1
}

/// Produces frames whose every byte equals [`stamp`] of the frame index.
///
/// The buffer is written in two halves with `latency` in between, so a reader
/// that could see a buffer mid-write would observe two different stamps.
pub(crate) struct StampedDecoder {
    header: AnimationHeader,
    durations: Vec<Duration>,
    latency: Duration,
    next: usize,
    fail_after: Option<usize>,
    seekable: bool,
    decoded: Arc<AtomicUsize>,
}

impl StampedDecoder {
    pub(crate) fn new(durations: &[Duration]) -> Self {
        Self {
            header: AnimationHeader {
                width: 8,
                height: 4,
                frame_count: durations.len(),
                loop_policy: LoopPolicy::Infinite,
            },
            durations: durations.to_vec(),
            latency: Duration::ZERO,
            next: 0,
            fail_after: None,
            seekable: true,
            decoded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` frames of `duration` each.
    pub(crate) fn uniform(count: usize, duration: Duration) -> Self {
        Self::new(&vec![duration; count])
    }

    pub(crate) fn loop_policy(mut self, policy: LoopPolicy) -> Self {
        self.header.loop_policy = policy;
        self
    }

    pub(crate) fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every decode call after `frames` successful ones.
    pub(crate) fn fail_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub(crate) fn not_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Counter of successful decode calls, shared with the test.
    pub(crate) fn decoded(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.decoded)
    }
}

impl FrameDecoder for StampedDecoder {
    fn open_header(&mut self) -> Result<AnimationHeader, DecodeError> {
        if !self.seekable {
            return Err(DecodeError::NotSeekable);
        }
        Ok(self.header)
    }

    fn decode_next_frame(&mut self, dest: &mut [u8]) -> Result<DecodeStep, DecodeError> {
        if self.fail_after.is_some_and(|limit| self.decoded.load(Ordering::SeqCst) >= limit) {
            return Err(DecodeError::Malformed("synthetic corruption".into()));
        }
        if self.next >= self.durations.len() {
            return Ok(DecodeStep::EndOfAnimation);
        }

        let value = stamp(self.next);
        let (head, tail) = dest.split_at_mut(dest.len() / 2);
        head.fill(value);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        tail.fill(value);

        let duration = self.durations[self.next];
        self.next += 1;
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(DecodeStep::Frame { duration })
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        self.next = 0;
        Ok(())
    }
}

/// A stream whose seek always fails, like a pipe.
pub(crate) struct NonSeekable<R>(pub(crate) R);

impl<R: Read> Read for NonSeekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Seek for NonSeekable<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "stream is not seekable"))
    }
}

/// One solid-colored frame with its own palette. `delay` is in centiseconds.
pub(crate) fn solid_frame(width: u16, height: u16, rgb: [u8; 3], delay: u16) -> gif::Frame<'static> {
    gif::Frame {
        width,
        height,
        delay,
        palette: Some(rgb.to_vec()),
        buffer: Cow::Owned(vec![0; usize::from(width) * usize::from(height)]),
        ..gif::Frame::default()
    }
}

/// Encode `frames` into an in-memory GIF.
pub(crate) fn gif_bytes(
    width: u16,
    height: u16,
    repeat: Option<gif::Repeat>,
    frames: &[gif::Frame<'static>],
) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width, height, &[]).unwrap();
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for frame in frames {
            encoder.write_frame(frame).unwrap();
        }
    }
    bytes
}

/// Collects events with the time they arrived.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<(Instant, PlayerEvent)>>>);

impl Recorder {
    pub(crate) fn sink(&self) -> impl FnMut(PlayerEvent) + Send + 'static {
        let events = Arc::clone(&self.0);
        move |event| events.lock().unwrap().push((Instant::now(), event))
    }

    pub(crate) fn events(&self) -> Vec<(Instant, PlayerEvent)> {
        self.0.lock().unwrap().clone()
    }

    /// `(arrival, sequence, index)` of every `FrameChanged`.
    pub(crate) fn frames(&self) -> Vec<(Instant, u64, usize)> {
        self.events()
            .into_iter()
            .filter_map(|(at, event)| match event {
                PlayerEvent::FrameChanged { sequence, index } => Some((at, sequence, index)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<DecodeError> {
        self.events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                PlayerEvent::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Every `(from, to)` state transition, in order.
    pub(crate) fn transitions(&self) -> Vec<(super::WorkerState, super::WorkerState)> {
        self.events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                PlayerEvent::StateChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
