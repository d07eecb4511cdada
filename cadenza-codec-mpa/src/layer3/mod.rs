// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::audio::{AudioBuffer, Signal};
use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::{BitReaderLtr, BufReader, ReadBitsLtr, ReadBytes};

mod bitstream;
mod common;
mod hybrid_synthesis;
mod requantize;
mod stereo;

use crate::{common::*, synthesis};

use common::BlockType;

use log::warn;

/// `BitReservoir` implements the bit reservoir mechanism for main_data. Since frames have a
/// deterministic length based on the bit-rate, low-complexity portions of the audio may not need
/// every byte allocated to the frame. The bit reservoir mechanism allows these unused portions
/// of frames to be used by future frames.
pub struct BitReservoir {
    buf: Box<[u8]>,
    len: usize,
    consumed: usize,
}

impl BitReservoir {
    pub fn new() -> Self {
        BitReservoir { buf: vec![0u8; 2048].into_boxed_slice(), len: 0, consumed: 0 }
    }

    /// Appends the main data of the current frame to the reservoir, preceded by the
    /// `main_data_begin` bytes of history the frame references. Returns the number of referenced
    /// bytes that were missing from the reservoir (0 when the back-pointer is satisfied).
    pub fn fill(&mut self, frame_main_data: &[u8], main_data_begin: usize) -> Result<u32> {
        let main_data_len = frame_main_data.len();
        let main_data_end = main_data_begin + main_data_len;

        // The value of main_data_begin is at most 511 and a frame body is bounded by the maximum
        // frame size, so this can only trip on an internally inconsistent caller.
        if main_data_end > self.buf.len() {
            return decode_error("mpa: invalid main_data length, will exceed reservoir buffer");
        }

        let unread = self.len - self.consumed;

        let underflow = if main_data_begin <= unread {
            // Shift the re-used bytes indicated by main_data_begin to the front of the
            // reservoir, then copy the main data of the current frame in after them.
            self.buf.copy_within(self.len - main_data_begin..self.len, 0);
            self.buf[main_data_begin..main_data_end].copy_from_slice(frame_main_data);
            self.len = main_data_end;

            0
        }
        else {
            // The back-pointer references more data than the reservoir holds. This occurs when
            // decoding starts in the middle of a stream. Keep all unread bytes, append the
            // current frame, and report how many bytes are missing so the caller can skip the
            // affected granules.
            self.buf.copy_within(self.len - unread..self.len, 0);
            self.buf[unread..unread + main_data_len].copy_from_slice(frame_main_data);
            self.len = unread + main_data_len;

            let underflow = (main_data_begin - unread) as u32;

            warn!("mpa: invalid main_data_begin, underflow by {} bytes", underflow);

            underflow
        };

        self.consumed = 0;

        Ok(underflow)
    }

    /// Marks `len` bytes of the reservoir as consumed.
    pub fn consume(&mut self, len: usize) {
        self.consumed = self.len.min(self.consumed + len);
    }

    /// Gets the unconsumed bytes of the reservoir.
    pub fn bytes_ref(&self) -> &[u8] {
        &self.buf[self.consumed..self.len]
    }

    /// Discards the contents of the reservoir.
    pub fn clear(&mut self) {
        self.len = 0;
        self.consumed = 0;
    }
}

/// `FrameData` contains the side_info and main_data portions of a MPEG audio frame.
#[derive(Default)]
struct FrameData {
    /// The byte offset backwards into the bit reservoir at which the main_data of this frame
    /// begins. If 0, main_data begins immediately after the side_info of this frame.
    main_data_begin: u16,
    /// Scale factor selection information, per channel. Each channel has 4 groups of bands whose
    /// granule 0 scale factors may be re-used by granule 1, indicated by a true.
    ///
    /// Mapping of array indices to bands: [0..6, 6..11, 11..16, 16..21].
    scfsi: [[bool; 4]; 2],
    /// The two granules of the frame.
    granules: [Granule; 2],
}

#[derive(Default)]
struct Granule {
    /// Channels in the granule.
    channels: [GranuleChannel; 2],
}

pub(crate) struct GranuleChannel {
    /// Total number of bits used for scale factors (part2) and Huffman encoded data (part3).
    pub part2_3_length: u16,
    /// HALF the number of samples in the big_values partition.
    pub big_values: u16,
    /// Logarithmic quantization step size.
    pub global_gain: u8,
    /// A 4-bit index into the scale factor bit length table.
    pub scalefac_compress: u16,
    /// The block type (window shape) of the channel in the granule.
    pub block_type: BlockType,
    /// Gain factors applied per short block window. Each has a maximum value of 7.
    pub subblock_gain: [u8; 3],
    /// The Huffman table selectors for the up-to 3 regions of big_values.
    pub table_select: [u8; 3],
    /// The index of the first sample in region1 of big_values.
    pub region1_start: usize,
    /// The index of the first sample in region2 of big_values.
    pub region2_start: usize,
    /// If set, the pre-emphasis table amounts are added onto each long band scale factor before
    /// requantization.
    pub preflag: bool,
    /// A 0.5x (false) or 1x (true) multiplier for scale factors.
    pub scalefac_scale: bool,
    /// Use Huffman quad table A (0) or B (1) for decoding the count1 partition.
    pub count1table_select: u8,
    /// Long and short window scale factors. The interpretation depends on the block type.
    ///
    /// For `BlockType::Short { is_mixed: false }`:
    ///   - `scalefacs[0..36]` are the short band scale factors, three windows per band.
    ///
    /// For `BlockType::Short { is_mixed: true }`:
    ///   - `scalefacs[0..8]` are the long band scale factors of the mixed region.
    ///   - `scalefacs[8..35]` are the short band scale factors starting at band 3.
    ///
    /// For all other block types:
    ///   - `scalefacs[0..21]` are the long band scale factors. Band 21 is never transmitted and
    ///     stays 0, which keeps pre-emphasis indexing of the final band in bounds.
    ///
    /// The final three short window scale factors are never transmitted and are always 0.
    pub scalefacs: [u8; 39],
    /// The index of the first sample of the all-zero rzero partition, i.e. the count of decoded
    /// big_values and count1 samples.
    pub rzero: usize,
}

impl Default for GranuleChannel {
    fn default() -> Self {
        GranuleChannel {
            part2_3_length: 0,
            big_values: 0,
            global_gain: 0,
            scalefac_compress: 0,
            block_type: BlockType::Long,
            subblock_gain: [0; 3],
            table_select: [0; 3],
            region1_start: 0,
            region2_start: 0,
            preflag: false,
            scalefac_scale: false,
            count1table_select: 0,
            scalefacs: [0; 39],
            rzero: 0,
        }
    }
}

/// The full Layer III decoder state.
pub struct Layer3 {
    samples: [[[f32; 576]; 2]; 2],
    overlap: [[[f32; 18]; 32]; 2],
    synthesis: [synthesis::SynthesisState; 2],
    reservoir: BitReservoir,
}

impl Layer3 {
    pub fn new() -> Self {
        Self {
            samples: [[[0f32; 576]; 2]; 2],
            overlap: [[[0f32; 18]; 32]; 2],
            synthesis: Default::default(),
            reservoir: BitReservoir::new(),
        }
    }

    /// Reads the main_data (scale factors and Huffman coded spectral samples) of all granules
    /// from the bit reservoir into `frame_data`, and returns the number of reservoir bytes
    /// consumed.
    fn read_main_data(
        &mut self,
        header: &FrameHeader,
        underflow_bits: u32,
        frame_data: &mut FrameData,
    ) -> Result<usize> {
        let main_data = self.reservoir.bytes_ref();
        let mut part2_3_begin = 0;
        let mut part2_3_skipped = 0;

        for gr in 0..header.n_granules() {
            // If the reservoir underflowed (main_data_begin references bytes not present in the
            // reservoir) then skip the granules the missing bytes would have coded. The skipped
            // granules decode to silence.
            if part2_3_skipped < underflow_bits {
                for ch in 0..header.n_channels() {
                    self.samples[gr][ch] = [0.0; 576];
                    frame_data.granules[gr].channels[ch].rzero = 0;
                    part2_3_skipped +=
                        u32::from(frame_data.granules[gr].channels[ch].part2_3_length);
                }

                // Adjust the start position of the next granule in the available main data.
                if part2_3_skipped > underflow_bits {
                    part2_3_begin = (part2_3_skipped - underflow_bits) as usize;
                }

                continue;
            }

            for ch in 0..header.n_channels() {
                let byte_index = part2_3_begin >> 3;

                if byte_index >= main_data.len() {
                    return decode_error("mpa: invalid main_data offset");
                }

                // Position a bit reader at the expected starting bit of this granule channel.
                let mut bs = BitReaderLtr::new(&main_data[byte_index..]);

                let bit_index = (part2_3_begin & 0x7) as u32;
                if bit_index > 0 {
                    bs.ignore_bits(bit_index)?;
                }

                // Read the scale factors (part2) and get the number of bits read.
                let part2_len = bitstream::read_scale_factors(&mut bs, gr, ch, frame_data)?;

                let part2_3_length = u32::from(frame_data.granules[gr].channels[ch].part2_3_length);

                if part2_len > part2_3_length {
                    return decode_error("mpa: part2_3_length is not valid");
                }

                // The Huffman coded spectral samples (part3) span the remaining bits.
                let part3_len = part2_3_length - part2_len;

                frame_data.granules[gr].channels[ch].rzero = requantize::read_huffman_samples(
                    &mut bs,
                    &frame_data.granules[gr].channels[ch],
                    part3_len,
                    &mut self.samples[gr][ch],
                )?;

                part2_3_begin += part2_3_length as usize;
            }
        }

        Ok((part2_3_begin + 7) >> 3)
    }
}

impl Layer for Layer3 {
    fn decode(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        out: &mut AudioBuffer,
    ) -> Result<()> {
        let mut frame_data: FrameData = Default::default();

        // The CRC is not verified.
        let _crc = if header.has_crc { Some(reader.read_be_u16()?) } else { None };

        let buf = reader.read_buf_bytes_available_ref();

        let mut bs = BitReaderLtr::new(buf);

        // Read the side_info into the frame data.
        let side_info_len = match bitstream::read_side_info(&mut bs, header, &mut frame_data) {
            Ok(len) => len,
            Err(e) => {
                // A failure reading this frame causes a discontinuity in the codec bitstream, so
                // the reservoir will not be valid for the next frame either.
                self.reservoir.clear();
                return Err(e);
            }
        };

        // Buffer the main data into the bit reservoir.
        let underflow =
            self.reservoir.fill(&buf[side_info_len..], frame_data.main_data_begin as usize)?;

        // Read the main data (scale factors and spectral samples).
        match self.read_main_data(header, 8 * underflow, &mut frame_data) {
            Ok(len) => {
                self.reservoir.consume(len);
            }
            Err(e) => {
                // The bit reservoir was likely filled with invalid data.
                self.reservoir.clear();
                return Err(e);
            }
        }

        for gr in 0..header.n_granules() {
            let granule = &mut frame_data.granules[gr];

            // Requantize all non-zero spectral samples, then return short block samples to
            // sub-band order, independently per channel.
            for ch in 0..header.n_channels() {
                requantize::requantize(header, &granule.channels[ch], &mut self.samples[gr][ch]);

                hybrid_synthesis::reorder(header, &granule.channels[ch], &mut self.samples[gr][ch]);
            }

            // Apply joint stereo processing onto the channel pair if required.
            if header.n_channels() == 2 {
                stereo::stereo(header, granule, &mut self.samples[gr])?;
            }

            // Each granule yields 576 frames. After reserving frames, all remaining steps are
            // infallible.
            out.render_reserved(Some(576));

            for ch in 0..header.n_channels() {
                // Apply the anti-aliasing filter to all block types other than short.
                hybrid_synthesis::antialias(&granule.channels[ch], &mut self.samples[gr][ch]);

                // Perform hybrid synthesis (IMDCT and windowing with overlap-add). After this
                // step the spectral buffer holds time-domain sub-band samples.
                hybrid_synthesis::hybrid_synthesis(
                    &granule.channels[ch],
                    &mut self.overlap[ch],
                    &mut self.samples[gr][ch],
                );

                // Invert every second sample in every second sub-band to negate the frequency
                // inversion of the polyphase filterbank.
                hybrid_synthesis::frequency_inversion(&mut self.samples[gr][ch]);

                // Perform polyphase synthesis and generate PCM samples.
                let out_ch_samples = out.chan_mut(ch);

                synthesis::synthesis(
                    &mut self.synthesis[ch],
                    18,
                    &self.samples[gr][ch],
                    &mut out_ch_samples[(gr * 576)..((gr + 1) * 576)],
                );
            }
        }

        Ok(())
    }
}
