// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::audio::{AudioBuffer, SampleBuffer, Signal, SignalSpec};
use cadenza_core::errors::{decode_error, unsupported_error, Error, Result};
use cadenza_core::io::BufReader;

use log::{debug, warn};

use crate::common::{FrameHeader, Layer, MpegLayer};
use crate::header;
#[cfg(feature = "mp1")]
use crate::layer1::Layer1;
#[cfg(feature = "mp3")]
use crate::layer3::Layer3;

/// Decoded PCM audio returned by [`MpaDecoder::decode`].
pub struct DecodedAudio {
    /// The decoded samples, interleaved by channel and normalized to [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// The stream sample rate in Hz, taken from the first decoded frame.
    pub sample_rate: u32,
    /// The stream channel count, taken from the first decoded frame.
    pub channels: usize,
}

/// A MPEG-1 audio (Layer I and Layer III) decoder.
///
/// The decoder consumes a raw byte stream, synchronizes on frame boundaries (tolerating leading
/// garbage), and appends the PCM samples of every decodable frame to its output. Inter-frame
/// state (the Layer III bit reservoir, IMDCT overlap tails, and the synthesis filterbank) is
/// kept inside the decoder, so a stream may also be fed across multiple calls split on frame
/// boundaries.
pub struct MpaDecoder {
    #[cfg(feature = "mp1")]
    layer1: Option<Layer1>,
    #[cfg(feature = "mp3")]
    layer3: Option<Layer3>,
    buf: AudioBuffer,
    sample_buf: Option<SampleBuffer>,
    spec: Option<SignalSpec>,
}

impl MpaDecoder {
    pub fn new() -> Self {
        MpaDecoder {
            #[cfg(feature = "mp1")]
            layer1: None,
            #[cfg(feature = "mp3")]
            layer3: None,
            buf: AudioBuffer::unused(),
            sample_buf: None,
            spec: None,
        }
    }

    /// Gets the signal specification of the stream, if at least one frame was decoded.
    pub fn signal_spec(&self) -> Option<SignalSpec> {
        self.spec
    }

    /// Discards all decoder state, as if the decoder were newly instantiated.
    pub fn reset(&mut self) {
        *self = MpaDecoder::new();
    }

    /// Decodes every audio frame in `stream` and returns the accumulated PCM.
    ///
    /// Leading non-audio bytes are skipped by scanning for frame synchronization. Frames with
    /// reserved or unsupported header fields are skipped. A truncated trailing frame stops
    /// decoding, returning the output accumulated so far. An error is returned only if no audio
    /// frame could be decoded at all.
    pub fn decode(&mut self, stream: &[u8]) -> Result<DecodedAudio> {
        let mut reader = BufReader::new(stream);
        let mut samples = Vec::new();

        loop {
            // Scan for the next frame header word. The scan ends at the end of the stream.
            let sync = match header::sync_frame(&mut reader) {
                Ok(sync) => sync,
                Err(Error::IoError(_)) => break,
                Err(err) => return Err(err),
            };

            let frame_header = match header::parse_frame_header(sync) {
                Ok(frame_header) => frame_header,
                Err(err) => {
                    // The header word is not decodable (reserved fields, or an unsupported
                    // version or bit-rate). Resume scanning at the byte after the first byte of
                    // the sync word.
                    debug!("mpa: skipping frame: {}", err);
                    reader.seek_buffered_rev(header::MPEG_HEADER_LEN - 1);
                    continue;
                }
            };

            // A frame body shorter than declared means the stream was truncated. Stop and
            // return the output accumulated so far.
            if reader.bytes_available() < frame_header.frame_size as u64 {
                break;
            }

            let body = reader.read_buf_bytes_ref(frame_header.frame_size)?;

            if let Err(err) = self.decode_frame(&frame_header, body) {
                // A frame that fails mid-decode contributes no samples, but decoding continues
                // with the next frame.
                warn!("mpa: dropped frame: {}", err);
                continue;
            }

            let sample_buf = self.sample_buf.as_mut().unwrap();
            sample_buf.copy_interleaved(&self.buf);
            samples.extend_from_slice(sample_buf.samples());
        }

        match self.spec {
            Some(spec) => Ok(DecodedAudio {
                samples,
                sample_rate: spec.rate,
                channels: spec.channels.count(),
            }),
            None => decode_error("mpa: no audio frames in stream"),
        }
    }

    /// Decodes as [`decode`](MpaDecoder::decode), after skipping a caller-measured metadata
    /// region (for example an ID3v2 tag) of `skip` bytes.
    pub fn decode_skipping(&mut self, stream: &[u8], skip: usize) -> Result<DecodedAudio> {
        self.decode(&stream[skip.min(stream.len())..])
    }

    /// Decodes a single frame body into the internal audio buffer.
    fn decode_frame(&mut self, frame_header: &FrameHeader, body: &[u8]) -> Result<()> {
        let spec = frame_header.spec();

        // The output buffers are sized for the longest frame of any layer.
        debug_assert!(frame_header.duration() <= 1152);

        // The output buffers can only be created once the signal specification is known. The
        // specification of the first frame is recorded as the stream's; rare mid-stream
        // specification changes re-shape the buffers but not the record.
        if self.buf.is_unused() || *self.buf.spec() != spec {
            self.buf = AudioBuffer::new(1152, spec);
            self.sample_buf = Some(SampleBuffer::new(1152, spec));
        }

        self.buf.clear();

        let mut reader = BufReader::new(body);

        match frame_header.layer {
            #[cfg(feature = "mp1")]
            MpegLayer::Layer1 => {
                self.layer1.get_or_insert_with(Layer1::new).decode(
                    &mut reader,
                    frame_header,
                    &mut self.buf,
                )?;
            }
            #[cfg(feature = "mp3")]
            MpegLayer::Layer3 => {
                self.layer3.get_or_insert_with(Layer3::new).decode(
                    &mut reader,
                    frame_header,
                    &mut self.buf,
                )?;
            }
            _ => return unsupported_error("mpa: unsupported MPEG layer"),
        }

        // Record the stream's signal specification once the first frame decodes successfully.
        if self.spec.is_none() {
            self.spec = Some(spec);
        }

        Ok(())
    }
}

impl Default for MpaDecoder {
    fn default() -> Self {
        MpaDecoder::new()
    }
}
