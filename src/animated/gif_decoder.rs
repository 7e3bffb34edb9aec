// SPDX-License-Identifier: MPL-2.0

//! GIF implementation of [`FrameDecoder`] built on the `gif` crate.
//!
//! Frames in a GIF may only cover part of the logical screen and say how
//! their area is disposed before the next frame is drawn. The decoder keeps a
//! full-size RGBA canvas, draws each frame onto it, and hands out the whole
//! canvas as BGRA.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info};

use super::decoder::{DecodeStep, FrameDecoder};
use super::detection::{is_gif_file, sniff_gif};
use super::types::{AnimationHeader, BYTES_PER_PIXEL, LoopPolicy};
use crate::error::{ConstructionError, DecodeError};

/// Reader handed to `gif::Decoder`; shares the stream so it can be rewound.
struct SharedStream<R>(Arc<Mutex<R>>);

impl<R: Read> Read for SharedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("animation stream lock poisoned"))?
            .read(buf)
    }
}

/// Area of the canvas a frame covered, and how to dispose of it.
#[derive(Debug, Clone, Copy)]
struct Disposal {
    method: gif::DisposalMethod,
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

/// Decodes GIF frames from a seekable stream.
pub struct GifDecoder<R: Read> {
    stream: Arc<Mutex<R>>,
    /// Stream position of the GIF signature.
    start: u64,
    header: Option<AnimationHeader>,
    decoder: Option<gif::Decoder<SharedStream<R>>>,
    /// Composited RGBA canvas.
    canvas: Vec<u8>,
    /// Canvas saved before a frame that is disposed with `Previous`.
    saved: Vec<u8>,
    pending_disposal: Option<Disposal>,
}

impl<R: Read + Seek + Send> GifDecoder<R> {
    /// Wrap `stream`. Nothing is read until [`FrameDecoder::open_header`].
    pub fn new(stream: R) -> Self {
        Self {
            stream: Arc::new(Mutex::new(stream)),
            start: 0,
            header: None,
            decoder: None,
            canvas: Vec::new(),
            saved: Vec::new(),
            pending_disposal: None,
        }
    }

    fn with_stream<T>(&self, f: impl FnOnce(&mut R) -> io::Result<T>) -> Result<T, DecodeError> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| io::Error::other("animation stream lock poisoned"))?;
        Ok(f(&mut stream)?)
    }

    fn seek_to_start(&self) -> Result<(), DecodeError> {
        let start = self.start;
        self.with_stream(|stream| stream.seek(SeekFrom::Start(start)).map(|_| ()))
    }

    /// Walk the whole stream without LZW decoding to count frames and read
    /// the loop count, which only becomes known once its extension is parsed.
    fn scan(&self) -> Result<(u16, u16, usize, gif::Repeat), DecodeError> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        options.skip_frame_decoding(true);

        let mut decoder = options.read_info(SharedStream(Arc::clone(&self.stream)))?;
        let mut frame_count = 0;
        while decoder.read_next_frame()?.is_some() {
            frame_count += 1;
        }

        Ok((decoder.width(), decoder.height(), frame_count, decoder.repeat()))
    }

    fn open_frames(&mut self) -> Result<(), DecodeError> {
        self.seek_to_start()?;
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        self.decoder = Some(options.read_info(SharedStream(Arc::clone(&self.stream)))?);
        self.canvas.fill(0);
        self.pending_disposal = None;
        Ok(())
    }
}

impl GifDecoder<BufReader<File>> {
    /// Open a GIF file.
    pub fn open_path(path: &Path) -> Result<Self, ConstructionError> {
        let file = File::open(path).map_err(ConstructionError::Source)?;
        let mut reader = BufReader::new(file);

        if !sniff_gif(&mut reader).map_err(ConstructionError::Source)? {
            let reason = if is_gif_file(path) {
                format!("{} has no GIF signature", path.display())
            } else {
                format!("{} is not a GIF", path.display())
            };
            return Err(ConstructionError::Unsupported(reason));
        }

        debug!(path = %path.display(), "Opening GIF");
        Ok(Self::new(reader))
    }
}

impl<R: Read + Seek + Send> FrameDecoder for GifDecoder<R> {
    fn open_header(&mut self) -> Result<AnimationHeader, DecodeError> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        self.start = self
            .with_stream(|stream| {
                let start = stream.stream_position()?;
                stream.seek(SeekFrom::Start(start))?;
                Ok(start)
            })
            .map_err(|_| DecodeError::NotSeekable)?;

        let (width, height, frame_count, repeat) = self.scan()?;
        if width == 0 || height == 0 {
            return Err(DecodeError::Malformed(format!(
                "logical screen is {width}x{height}"
            )));
        }
        if frame_count == 0 {
            return Err(DecodeError::NoFrames);
        }

        let loop_policy = match repeat {
            gif::Repeat::Infinite => LoopPolicy::Infinite,
            // The stored count is repetitions after the first play.
            gif::Repeat::Finite(repetitions) => LoopPolicy::Finite(repetitions.saturating_add(1)),
        };

        let header = AnimationHeader {
            width: u32::from(width),
            height: u32::from(height),
            frame_count,
            loop_policy,
        };
        info!(
            width = header.width,
            height = header.height,
            frames = frame_count,
            ?loop_policy,
            "Opened GIF"
        );

        self.canvas = vec![0; header.frame_len()];
        self.header = Some(header);
        self.open_frames()?;
        Ok(header)
    }

    fn decode_next_frame(&mut self, dest: &mut [u8]) -> Result<DecodeStep, DecodeError> {
        let header = self.open_header()?;
        if dest.len() != header.frame_len() {
            return Err(DecodeError::BufferSize {
                expected: header.frame_len(),
                actual: dest.len(),
            });
        }
        if self.decoder.is_none() {
            self.open_frames()?;
        }

        if let Some(disposal) = self.pending_disposal.take() {
            dispose(&mut self.canvas, &self.saved, header.width, disposal);
        }

        let Some(decoder) = self.decoder.as_mut() else {
            return Err(DecodeError::Malformed("decoder unavailable".into()));
        };
        let Some(frame) = decoder.read_next_frame()? else {
            return Ok(DecodeStep::EndOfAnimation);
        };

        let disposal = Disposal {
            method: frame.dispose,
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
        };
        if disposal.method == gif::DisposalMethod::Previous {
            self.saved.clone_from(&self.canvas);
        }

        draw(&mut self.canvas, header.width, header.height, disposal, &frame.buffer)?;
        let duration = Duration::from_millis(u64::from(frame.delay) * 10);
        self.pending_disposal = Some(disposal);

        write_bgra(&self.canvas, dest);
        Ok(DecodeStep::Frame { duration })
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        self.decoder = None;
        self.open_frames()
    }
}

/// Draw an RGBA `frame` covering `area` onto `canvas`, skipping transparent
/// pixels and clipping to the logical screen.
fn draw(
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    area: Disposal,
    frame: &[u8],
) -> Result<(), DecodeError> {
    let frame_stride = area.width as usize * BYTES_PER_PIXEL;
    if frame.len() < frame_stride * area.height as usize {
        return Err(DecodeError::Malformed(format!(
            "frame data holds {} bytes for a {}x{} frame",
            frame.len(),
            area.width,
            area.height
        )));
    }

    let visible_width = area.width.min(canvas_width.saturating_sub(area.left)) as usize;
    let visible_rows = area.height.min(canvas_height.saturating_sub(area.top));
    if visible_width == 0 || visible_rows == 0 {
        debug!(left = area.left, top = area.top, "frame lies outside the logical screen");
        return Ok(());
    }
    let canvas_stride = canvas_width as usize * BYTES_PER_PIXEL;

    for row in 0..visible_rows {
        let src = &frame[row as usize * frame_stride..][..visible_width * BYTES_PER_PIXEL];
        let offset = (area.top + row) as usize * canvas_stride + area.left as usize * BYTES_PER_PIXEL;
        let dst = &mut canvas[offset..][..visible_width * BYTES_PER_PIXEL];
        for (dst, src) in dst
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(src.chunks_exact(BYTES_PER_PIXEL))
        {
            if src[3] != 0 {
                dst.copy_from_slice(src);
            }
        }
    }
    Ok(())
}

/// Apply the disposal of the previous frame before drawing the next one.
fn dispose(canvas: &mut [u8], saved: &[u8], canvas_width: u32, disposal: Disposal) {
    let restore_from = match disposal.method {
        gif::DisposalMethod::Background => None,
        gif::DisposalMethod::Previous if saved.len() == canvas.len() => Some(saved),
        _ => return,
    };

    let canvas_stride = canvas_width as usize * BYTES_PER_PIXEL;
    let canvas_rows = canvas.len() / canvas_stride.max(1);
    let visible_width = disposal.width.min(canvas_width.saturating_sub(disposal.left)) as usize;
    if visible_width == 0 {
        return;
    }
    let first_row = disposal.top as usize;
    let last_row = (first_row + disposal.height as usize).min(canvas_rows);

    for row in first_row..last_row {
        let offset = row * canvas_stride + disposal.left as usize * BYTES_PER_PIXEL;
        let range = offset..offset + visible_width * BYTES_PER_PIXEL;
        match restore_from {
            Some(saved) => canvas[range.clone()].copy_from_slice(&saved[range]),
            None => canvas[range].fill(0),
        }
    }
}

/// Convert an RGBA canvas to BGRA.
fn write_bgra(rgba: &[u8], bgra: &mut [u8]) {
    bgra.par_chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(rgba.par_chunks_exact(BYTES_PER_PIXEL))
        .for_each(|(dst, src)| {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        });
}

impl<R: Read> std::fmt::Debug for GifDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifDecoder")
            .field("start", &self.start)
            .field("header", &self.header)
            .field("pending_disposal", &self.pending_disposal)
            .finish_non_exhaustive()
    }
}
