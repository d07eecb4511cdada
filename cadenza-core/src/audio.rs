// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides primitives for working with multi-channel audio buffers.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// `Channels` is a bit mask of all channels contained in a signal.
    #[derive(Default)]
    pub struct Channels: u32 {
        /// Front-left (left) or the Mono channel.
        const FRONT_LEFT  = 0x0000_0001;
        /// Front-right (right) channel.
        const FRONT_RIGHT = 0x0000_0002;
    }
}

impl Channels {
    /// Gets the number of channels.
    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#032b}", self.bits())
    }
}

/// `Layout` describes common audio channel configurations.
#[derive(Copy, Clone, Debug)]
pub enum Layout {
    /// Single centre channel.
    Mono,
    /// Left and Right channels.
    Stereo,
}

impl Layout {
    /// Converts a channel `Layout` into a `Channels` bit mask.
    fn into_channels(self) -> Channels {
        match self {
            Layout::Mono => Channels::FRONT_LEFT,
            Layout::Stereo => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        }
    }
}

/// `SignalSpec` describes the characteristics of a signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalSpec {
    /// The signal sampling rate in hertz (Hz).
    pub rate: u32,
    /// The channel assignments of the signal. The order of the channels in the vector is the
    /// order in which each channel sample is stored in a frame.
    pub channels: Channels,
}

impl SignalSpec {
    pub fn new(rate: u32, channels: Channels) -> Self {
        SignalSpec { rate, channels }
    }

    pub fn new_with_layout(rate: u32, layout: Layout) -> Self {
        SignalSpec { rate, channels: layout.into_channels() }
    }
}

/// `Signal` provides operations over the planar sample storage of an audio buffer.
pub trait Signal {
    /// Gets the number of actual frames written to the buffer. Conversely, this also is the
    /// number of written samples in any one channel.
    fn frames(&self) -> usize;

    /// Clears all written frames from the buffer. This is a cheap operation and does not zero
    /// the underlying audio data.
    fn clear(&mut self);

    /// Gets an immutable reference to all the written samples in the specified channel.
    fn chan(&self, channel: usize) -> &[f32];

    /// Gets a mutable reference to all the written samples in the specified channel.
    fn chan_mut(&mut self, channel: usize) -> &mut [f32];

    /// Renders a reserved number of frames. This is a cheap operation and simply advances the
    /// frame counter. The underlying audio data is not modified and should be overwritten
    /// through other means.
    ///
    /// If `n_frames` is `None`, the remaining number of frames will be used. If `n_frames` is
    /// too large, this function will panic.
    fn render_reserved(&mut self, n_frames: Option<usize>);
}

/// `AudioBuffer` is a planar buffer of single-precision floating point audio samples.
pub struct AudioBuffer {
    buf: Vec<f32>,
    spec: SignalSpec,
    n_frames: usize,
    n_capacity: usize,
}

impl AudioBuffer {
    /// Instantiate a new `AudioBuffer` using the specified signal specification and of the given
    /// duration in frames.
    pub fn new(duration: u64, spec: SignalSpec) -> Self {
        let n_sample_capacity = duration * spec.channels.count() as u64;

        // Practically speaking, it is not possible to allocate more than usize samples.
        assert!(n_sample_capacity <= usize::MAX as u64);

        AudioBuffer {
            buf: vec![0f32; n_sample_capacity as usize],
            spec,
            n_frames: 0,
            n_capacity: duration as usize,
        }
    }

    /// Instantiates an unused `AudioBuffer`. An unused `AudioBuffer` will not allocate any
    /// memory, has a sample rate of 0, and no audio channels.
    pub fn unused() -> Self {
        AudioBuffer {
            buf: Vec::new(),
            spec: SignalSpec::new(0, Channels::empty()),
            n_frames: 0,
            n_capacity: 0,
        }
    }

    /// Returns `true` if the `AudioBuffer` is unused.
    pub fn is_unused(&self) -> bool {
        self.n_capacity == 0
    }

    /// Gets the signal specification for the buffer.
    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    /// Gets the total capacity of the buffer. The capacity is the maximum number of frames the
    /// buffer can store.
    pub fn capacity(&self) -> usize {
        self.n_capacity
    }
}

impl Signal for AudioBuffer {
    fn frames(&self) -> usize {
        self.n_frames
    }

    fn clear(&mut self) {
        self.n_frames = 0;
    }

    fn chan(&self, channel: usize) -> &[f32] {
        let start = channel * self.n_capacity;
        let end = start + self.n_frames;

        // Do not exceed the audio buffer.
        assert!(end <= self.buf.len());

        &self.buf[start..end]
    }

    fn chan_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.n_capacity;
        let end = start + self.n_frames;

        // Do not exceed the audio buffer.
        assert!(end <= self.buf.len());

        &mut self.buf[start..end]
    }

    fn render_reserved(&mut self, n_frames: Option<usize>) {
        let n_reserved_frames = n_frames.unwrap_or(self.n_capacity - self.n_frames);
        // Do not render past the end of the audio buffer.
        assert!(self.n_frames + n_reserved_frames <= self.n_capacity);
        self.n_frames += n_reserved_frames;
    }
}

/// A `SampleBuffer` is a flat buffer for exporting samples from an `AudioBuffer` in interleaved
/// channel order.
pub struct SampleBuffer {
    buf: Vec<f32>,
    n_written: usize,
}

impl SampleBuffer {
    /// Instantiate a new `SampleBuffer` with a capacity of `duration` frames of the given
    /// specification.
    pub fn new(duration: u64, spec: SignalSpec) -> SampleBuffer {
        let n_samples = duration * spec.channels.count() as u64;

        assert!(n_samples <= usize::MAX as u64);

        SampleBuffer { buf: vec![0f32; n_samples as usize], n_written: 0 }
    }

    /// Gets the number of written samples.
    pub fn len(&self) -> usize {
        self.n_written
    }

    /// Returns `true` if the buffer contains no written samples.
    pub fn is_empty(&self) -> bool {
        self.n_written == 0
    }

    /// Gets an immutable slice of all written samples.
    pub fn samples(&self) -> &[f32] {
        &self.buf[..self.n_written]
    }

    /// Gets the maximum number of samples the `SampleBuffer` may store.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Copies all audio frames from `src` into the `SampleBuffer` in interleaved channel order.
    pub fn copy_interleaved(&mut self, src: &AudioBuffer) {
        let n_frames = src.frames();
        let n_channels = src.spec().channels.count();
        let n_samples = n_frames * n_channels;

        // Ensure that the source will fit in the sample buffer.
        assert!(n_samples <= self.capacity());

        for ch in 0..n_channels {
            let src_ch = src.chan(ch);
            for (frame, &sample) in src_ch.iter().enumerate() {
                self.buf[frame * n_channels + ch] = sample;
            }
        }

        self.n_written = n_samples;
    }
}
