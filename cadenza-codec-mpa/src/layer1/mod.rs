// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::audio::{AudioBuffer, Signal};
use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::{BitReaderLtr, BufReader, ReadBitsLtr, ReadBytes};
use cadenza_core::util::bits::sign_extend_leq32_to_i32;

use crate::common::*;
use crate::synthesis;

use lazy_static::lazy_static;

lazy_static! {
    /// Scale factors for layers 1 and 2, indexed by the 6-bit coded value:
    ///
    /// ```text
    /// scalefactor[i] = 2.0 * 2^(-i/3)
    /// ```
    static ref SCALEFACTORS: [f32; 64] = {
        let mut scalefactors = [0f32; 64];

        for (i, sf) in scalefactors.iter_mut().enumerate() {
            *sf = (2.0 * f64::powf(2.0, -(i as f64) / 3.0)) as f32;
        }

        scalefactors
    };

    static ref FACTOR: [f32; 16] = {
        let mut factor = [0f32; 16];

        for (i, factor) in factor.iter_mut().enumerate().skip(2) {
            // As per ISO/IEC 11172-3, given the nb-bit raw sample, val, with an inverted most
            // significant bit, dequantization is:
            //
            // fractional = val / 2^(nb - 1)
            // dequantized = (2^nb / (2^nb - 1)) * (fractional + 2^(-nb + 1))
            //
            // After combining and simplifying, the complete calculation becomes:
            //
            // [(2^nb) / ((2^nb) - 1) * 2^(-nb + 1)] * (val + 1)
            // -------------------------------------
            //                factor
            //
            // This lookup table generator computes factor for nb between 2..15, inclusive.
            let a = 1 << i;
            let b = 1 << (i - 1);

            *factor = (a as f32 / (a - 1) as f32) * (b as f32).recip();
        }

        factor
    };
}

/// Dequantize a raw sample of `bits` bits.
#[inline(always)]
fn dequantize(bits: u32, factor: f32, raw: u32) -> f32 {
    // Invert the most significant bit.
    let inv = raw ^ 1 << (bits - 1);

    // Sign extend the sample.
    let a = sign_extend_leq32_to_i32(inv, bits);

    // Dequantize the sample.
    factor * (a + 1) as f32
}

/// The full Layer I decoder state.
pub struct Layer1 {
    synthesis: [synthesis::SynthesisState; 2],
}

impl Layer1 {
    pub fn new() -> Self {
        Self { synthesis: Default::default() }
    }
}

impl Layer for Layer1 {
    fn decode(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        out: &mut AudioBuffer,
    ) -> Result<()> {
        // The CRC is not verified.
        let _crc = if header.has_crc { Some(reader.read_be_u16()?) } else { None };

        let mut bs = BitReaderLtr::new(reader.read_buf_bytes_available_ref());

        let mut alloc = [[0u8; 32]; 2];
        let mut scalefacs = [[0f32; 32]; 2];

        let num_channels = header.n_channels();

        // In joint stereo, sub-bands at and above the bound are intensity coded: a single sample
        // stream is shared by both channels, scaled per-channel.
        let bound = match header.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { bound }) => bound as usize,
            ChannelMode::JointStereo(Mode::Layer3 { .. }) => {
                // The layer 3 mode extension is never attached to a layer 1 frame header.
                return decode_error("mpa: invalid mode extension for layer 1 stereo decoding");
            }
            _ => 32,
        };

        // Read the bit allocation of each independently coded sub-band.
        for sb in 0..bound {
            for chan in alloc.iter_mut().take(num_channels) {
                let bits = bs.read_bits_leq32(4)? as u8;

                if bits > 0xe {
                    return decode_error("mpa: invalid bit allocation");
                }

                chan[sb] = if bits != 0 { bits + 1 } else { 0 };
            }
        }

        // Read the bit allocation of the intensity coded sub-bands.
        for sb in bound..32 {
            let bits = bs.read_bits_leq32(4)? as u8;

            if bits > 0xe {
                return decode_error("mpa: invalid bit allocation");
            }

            let ba = if bits != 0 { bits + 1 } else { 0 };

            alloc[0][sb] = ba;
            alloc[1][sb] = ba;
        }

        // Read the scale factor of each sub-band with a non-zero allocation.
        for sb in 0..32 {
            for ch in 0..num_channels {
                if alloc[ch][sb] != 0 {
                    let index = bs.read_bits_leq32(6)? as usize;

                    scalefacs[ch][sb] = SCALEFACTORS[index];
                }
            }
        }

        let factor: &[f32; 16] = &FACTOR;

        // Decode the sub-band samples. A layer 1 frame carries 12 samples per sub-band.
        let mut samples = [[0f32; 384]; 2];

        for s in 0..12 {
            for sb in 0..bound {
                for ch in 0..num_channels {
                    let bits = u32::from(alloc[ch][sb]);

                    if bits != 0 {
                        let raw = bs.read_bits_leq32(bits)?;

                        let sample = dequantize(bits, factor[bits as usize], raw);

                        // Unscale the sample.
                        samples[ch][12 * sb + s] = scalefacs[ch][sb] * sample;
                    }
                }
            }

            // Intensity coded sub-bands carry one sample for both channels.
            for sb in bound..32 {
                let bits = u32::from(alloc[0][sb]);

                if bits != 0 {
                    let raw = bs.read_bits_leq32(bits)?;

                    let sample = dequantize(bits, factor[bits as usize], raw);

                    for ch in 0..num_channels {
                        samples[ch][12 * sb + s] = scalefacs[ch][sb] * sample;
                    }
                }
            }
        }

        // Each frame yields 384 audio frames. After reserving frames, all remaining steps are
        // infallible.
        out.render_reserved(Some(384));

        for (ch, samples) in samples.iter().enumerate().take(num_channels) {
            // Perform polyphase synthesis and generate PCM samples.
            synthesis::synthesis(&mut self.synthesis[ch], 12, samples, out.chan_mut(ch));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{dequantize, FACTOR, SCALEFACTORS};

    #[test]
    fn verify_scalefactors() {
        // scalefactor[0] = 2.0, and each step divides by the cube root of 2.
        assert!((SCALEFACTORS[0] - 2.0).abs() < 1e-6);
        assert!((SCALEFACTORS[3] - 1.0).abs() < 1e-6);
        assert!((SCALEFACTORS[6] - 0.5).abs() < 1e-6);

        let cbrt2 = 2.0f32.powf(1.0 / 3.0);
        for i in 1..64 {
            assert!((SCALEFACTORS[i - 1] / SCALEFACTORS[i] - cbrt2).abs() < 1e-5);
        }
    }

    #[test]
    fn verify_dequantize() {
        // For a 2-bit sample the dequantization steps are (4/3) * (s''' + 1/2) where s''' is
        // the re-signed fractional sample.
        let factor = FACTOR[2];

        // raw = 0b00 -> s''' = -1.0 -> -2/3
        assert!((dequantize(2, factor, 0b00) + 2.0 / 3.0).abs() < 1e-6);
        // raw = 0b01 -> s''' = -0.5 -> 0
        assert!(dequantize(2, factor, 0b01).abs() < 1e-6);
        // raw = 0b10 -> s''' = 0.0 -> 2/3
        assert!((dequantize(2, factor, 0b10) - 2.0 / 3.0).abs() < 1e-6);
        // raw = 0b11 -> s''' = 0.5 -> 4/3
        assert!((dequantize(2, factor, 0b11) - 4.0 / 3.0).abs() < 1e-6);
    }
}
