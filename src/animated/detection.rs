// SPDX-License-Identifier: MPL-2.0

//! File type detection utilities for animated sources.
//!
//! A source is accepted only when its first bytes carry a GIF signature.
//! The extension is consulted solely to word the rejection.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Extensions checked case-insensitively.
const GIF_EXTENSIONS: &[&str] = &["gif"];

/// Both GIF signature versions.
const GIF_SIGNATURES: &[&[u8; 6]] = &[b"GIF87a", b"GIF89a"];

/// Check if a file is a GIF based on its extension.
#[must_use]
pub fn is_gif_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            GIF_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Check whether `bytes` starts with a GIF signature.
#[must_use]
pub fn has_gif_signature(bytes: &[u8]) -> bool {
    GIF_SIGNATURES
        .iter()
        .any(|signature| bytes.starts_with(&signature[..]))
}

/// Peek at the signature of `stream`, leaving its position unchanged.
pub fn sniff_gif<R: Read + Seek>(stream: &mut R) -> io::Result<bool> {
    let start = stream.stream_position()?;
    let mut signature = [0u8; 6];
    let mut filled = 0;
    while filled < signature.len() {
        match stream.read(&mut signature[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    stream.seek(SeekFrom::Start(start))?;
    Ok(has_gif_signature(&signature[..filled]))
}
