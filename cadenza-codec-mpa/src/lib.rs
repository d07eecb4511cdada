// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A decoder for MPEG-1 audio elementary streams.
//!
//! Layer III (MP3) is the primary decode path, with the complete hybrid filterbank pipeline:
//! frame synchronization, side information, bit reservoir reassembly, scale factors, Huffman
//! coded spectral samples, requantization, short block reordering, joint (mid-side) stereo,
//! alias reduction, the 12/36-point IMDCT with overlap-add, frequency inversion, and the
//! 32-band polyphase synthesis filterbank. Layer I shares the synthesis filterbank.
//!
//! The decoder is a library: it consumes an in-memory byte stream positioned at (or before) the
//! first audio frame and produces interleaved, normalized `f32` PCM samples together with the
//! stream's signal specification.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod common;
mod decoder;
mod header;
#[cfg(feature = "mp3")]
mod huffman_tables;
#[cfg(feature = "mp1")]
mod layer1;
#[cfg(feature = "mp3")]
mod layer3;
mod synthesis;

pub use decoder::{DecodedAudio, MpaDecoder};
