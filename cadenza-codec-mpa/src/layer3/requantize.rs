// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use cadenza_core::errors::Result;
use cadenza_core::io::ReadBitsLtr;

use lazy_static::lazy_static;
use log::{info, warn};

use crate::common::*;
use crate::huffman_tables::{HuffmanTable, HUFFMAN_TABLES, QUAD_CODES_A};

use super::{common::*, GranuleChannel};

lazy_static! {
    /// Lookup table for computing x(i) = s(i)^(4/3) where s(i) is a decoded Huffman sample. The
    /// value of s(i) is bound between 0..8207 (15 plus the largest 13-bit linbits escape).
    static ref REQUANTIZE_POW43: Vec<f32> = {
        let mut pow43 = vec![0f32; 8207];
        for (i, pow43) in pow43.iter_mut().enumerate() {
            *pow43 = f32::powf(i as f32, 4.0 / 3.0);
        }
        pow43
    };
}

/// Decodes one big_values codeword from the stream using the given table and returns the (x, y)
/// value pair and the codeword length.
///
/// The next 24 bits (the longest codeword is 19 bits) are peeked and the table is scanned for
/// the entry whose codeword matches the leading bits, which are then consumed.
fn read_pair<B: ReadBitsLtr>(
    bs: &mut B,
    table: &HuffmanTable,
) -> Result<Option<(usize, usize, u32)>> {
    let peek = bs.peek_bits_leq32(24);

    for (x, row) in table.codes.iter().enumerate() {
        for (y, &(code, len)) in row.iter().enumerate() {
            if code == peek >> (24 - len) {
                bs.ignore_bits(len)?;
                return Ok(Some((x, y, len)));
            }
        }
    }

    Ok(None)
}

/// Decodes one count1 quad codeword from table A and returns the quad value and the codeword
/// length, or `None` if no codeword matches.
fn read_quad_a<B: ReadBitsLtr>(bs: &mut B) -> Result<Option<(u32, u32)>> {
    let peek = bs.peek_bits_leq32(24);

    for (value, &(code, len)) in QUAD_CODES_A.iter().enumerate() {
        if code == peek >> (24 - len) {
            bs.ignore_bits(len)?;
            return Ok(Some((value as u32, len)));
        }
    }

    Ok(None)
}

/// Reads the Huffman coded spectral samples for a given channel in a granule into the provided
/// sample buffer, and returns the number of decoded samples (the starting index of the rzero
/// partition).
///
/// Note, each spectral sample is raised to the (4/3)-rd power here. This is not actually part of
/// the Huffman decoding process, but converting the integer sample to floating point at this
/// point avoids an extra integer buffer.
pub(super) fn read_huffman_samples<B: ReadBitsLtr>(
    bs: &mut B,
    channel: &GranuleChannel,
    part3_bits: u32,
    buf: &mut [f32; 576],
) -> Result<usize> {
    // If there are no Huffman code bits, zero all samples and return immediately.
    if part3_bits == 0 {
        *buf = [0.0; 576];
        return Ok(0);
    }

    // Dereference the lazy_static once per granule.
    let pow43_table: &[f32] = &REQUANTIZE_POW43;

    let mut bits_read = 0;
    let mut i = 0;

    // There are two samples per big_value.
    let big_values_len = 2 * channel.big_values as usize;

    // There are up-to 3 regions in the big_values partition. Determine the sample index denoting
    // the end of each region (non-inclusive), clamped to the end of the partition.
    let regions: [usize; 3] = [
        min(channel.region1_start, big_values_len),
        min(channel.region2_start, big_values_len),
        min(576, big_values_len),
    ];

    for (region_idx, region_end) in regions.iter().enumerate() {
        // Select the Huffman table based on the region's table_select value.
        let table = &HUFFMAN_TABLES[channel.table_select[region_idx] as usize];

        // A selector of 0 (or the unused tables 4 and 14) decodes the entire region to zero
        // sample pairs without consuming any bits.
        if table.codes.is_empty() {
            while i < *region_end {
                buf[i] = 0.0;
                i += 1;
                buf[i] = 0.0;
                i += 1;
            }
            continue;
        }

        while i < *region_end && bits_read < part3_bits {
            let (mut x, mut y, code_len) = match read_pair(bs, table)? {
                Some(pair) => pair,
                None => {
                    // No codeword matched. The remaining bits of this granule channel cannot be
                    // trusted; decode the rest of the spectrum as zero.
                    warn!("mpa: no matching huffman codeword, zeroing remainder of granule");
                    for sample in buf[i..].iter_mut() {
                        *sample = 0.0;
                    }
                    return Ok(i);
                }
            };
            bits_read += code_len;

            // If the first sample, x, is not 0, further process it.
            if x > 0 {
                // If x is saturated, and the table has linbits, then read linbits extra bits and
                // add them to the sample.
                if x == 15 && table.linbits > 0 {
                    x += bs.read_bits_leq32(table.linbits)? as usize;
                    bits_read += table.linbits;
                }

                // The next bit is the sign bit. The magnitude of the sample is raised to the
                // (4/3) power.
                buf[i] = if bs.read_bit()? { -pow43_table[x] } else { pow43_table[x] };
                bits_read += 1;
            }
            else {
                buf[i] = 0.0;
            }

            i += 1;

            // Likewise for the second sample, y.
            if y > 0 {
                if y == 15 && table.linbits > 0 {
                    y += bs.read_bits_leq32(table.linbits)? as usize;
                    bits_read += table.linbits;
                }

                buf[i] = if bs.read_bit()? { -pow43_table[y] } else { pow43_table[y] };
                bits_read += 1;
            }
            else {
                buf[i] = 0.0;
            }

            i += 1;
        }
    }

    // Read the count1 partition: quads of (v, w, x, y) samples, each sample being 0 or +/-1.
    while i <= 572 && bits_read < part3_bits {
        let value = if channel.count1table_select == 1 {
            // Quad table B is a fixed 4-bit code. The quad is the inverted bit pattern.
            bits_read += 4;
            !bs.read_bits_leq32(4)? & 0xf
        }
        else {
            match read_quad_a(bs)? {
                Some((value, code_len)) => {
                    bits_read += code_len;
                    value
                }
                None => {
                    warn!("mpa: no matching huffman codeword, zeroing remainder of granule");
                    for sample in buf[i..].iter_mut() {
                        *sample = 0.0;
                    }
                    return Ok(i);
                }
            }
        };

        // For each 1 bit in the quad, read a sign bit and emit +/-1. A 0 bit emits 0.
        for j in 0..4 {
            if value & (0x8 >> j) != 0 {
                buf[i] = if bs.read_bit()? { -1.0 } else { 1.0 };
                bits_read += 1;
            }
            else {
                buf[i] = 0.0;
            }

            i += 1;
        }
    }

    // Ignore any remaining "stuffing" bits.
    if bits_read < part3_bits {
        bs.ignore_bits(part3_bits - bits_read)?;
    }
    // Some encoders stuff part3 such that the final quad read overruns part2_3_length. The bits
    // of that quad are random data and not a real sample, so erase it. The caller re-aligns the
    // bitstream via part2_3_length, so nothing needs to be rewound.
    else if bits_read > part3_bits {
        info!("mpa: count1 overrun, malformed bitstream");
        i = i.saturating_sub(4);
    }

    // The partition after count1 is rzero, where all samples are 0.
    for sample in buf[i..].iter_mut() {
        *sample = 0.0;
    }

    Ok(i)
}

/// The pre-emphasis table from table B.6 of ISO/IEC 11172-3, indexed by long scale-factor band.
const PRE_EMPHASIS: [u8; 22] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0];

/// Requantize long block samples in `buf` over the given scale-factor band boundaries.
fn requantize_long(channel: &GranuleChannel, bands: &[usize], buf: &mut [f32; 576]) {
    // For long blocks, dequantization and scaling is governed by:
    //
    //     xr(i) = s(i)^(4/3) * 2^(0.25*A) * 2^(-B)
    // where:
    //     s(i) is the decoded Huffman sample
    //     A = global_gain - 210
    //     B = scalefac_multiplier * (scalefacs[sfb] + preflag * pretab[sfb])
    //
    // The samples in buf are already s(i)^(4/3), so only the two power terms are multiplied in.
    // The scalefac_multiplier of 0.5 or 1.0 is folded into B as a shift of 1 or 2 so that the
    // exponents combine into a single 2^{0.25 * (A - B')} term.
    debug_assert!(bands.len() <= 23);

    let a = i32::from(channel.global_gain) - 210;

    let scalefac_shift = if channel.scalefac_scale { 2 } else { 1 };

    for (sfb, (start, end)) in bands.iter().zip(&bands[1..]).enumerate() {
        // Bands starting at or after the rzero partition are all zero and need no requantizing.
        if *start >= channel.rzero {
            break;
        }

        let pre_emphasis = if channel.preflag { PRE_EMPHASIS[sfb] } else { 0 };

        let b = i32::from((channel.scalefacs[sfb] + pre_emphasis) << scalefac_shift);

        let pow2ab = f64::powf(2.0, 0.25 * f64::from(a - b)) as f32;

        let band_end = min(*end, channel.rzero);

        for sample in buf[*start..band_end].iter_mut() {
            *sample *= pow2ab;
        }
    }
}

/// Requantize short block samples in `buf`. The band boundaries enumerate every window of every
/// short band, and `switch` is the index of the first short scale factor (0 for a pure short
/// block, the number of long bands for a mixed block).
fn requantize_short(
    channel: &GranuleChannel,
    bands: &[usize],
    switch: usize,
    buf: &mut [f32; 576],
) {
    // For short blocks, dequantization and scaling is governed by:
    //
    //     xr(i) = s(i)^(4/3) * 2^(0.25*A) * 2^(-B)
    // where:
    //     A = global_gain - 210 - (8 * subblock_gain[win])
    //     B = scalefac_multiplier * scalefacs[sfb][win]
    debug_assert!(bands.len() <= 40);

    let gain = i32::from(channel.global_gain) - 210;

    // A is constant per window.
    let a = [
        gain - 8 * i32::from(channel.subblock_gain[0]),
        gain - 8 * i32::from(channel.subblock_gain[1]),
        gain - 8 * i32::from(channel.subblock_gain[2]),
    ];

    let scalefac_shift = if channel.scalefac_scale { 2 } else { 1 };

    for (i, (start, end)) in bands.iter().zip(&bands[1..]).enumerate() {
        if *start >= channel.rzero {
            break;
        }

        // Consecutive bands cycle through the three windows of each short scale-factor band.
        let b = i32::from(channel.scalefacs[switch + i] << scalefac_shift);

        let pow2ab = f64::powf(2.0, 0.25 * f64::from(a[i % 3] - b)) as f32;

        let win_end = min(*end, channel.rzero);

        for sample in buf[*start..win_end].iter_mut() {
            *sample *= pow2ab;
        }
    }
}

/// Requantize the spectral samples in `buf` for any block type.
pub(super) fn requantize(header: &FrameHeader, channel: &GranuleChannel, buf: &mut [f32; 576]) {
    match channel.block_type {
        BlockType::Short { is_mixed: false } => {
            requantize_short(channel, &SFB_SHORT_BANDS[header.sample_rate_idx], 0, buf);
        }
        BlockType::Short { is_mixed: true } => {
            // A mixed block is a long block for the first two sub-bands (36 samples) and short
            // blocks thereafter, so requantization decomposes into a long pass over the leading
            // bands and a short pass over the remainder starting at short band 3.
            let bands = &SFB_MIXED_BANDS[header.sample_rate_idx];

            requantize_long(channel, &bands[..SFB_MIXED_SWITCH_POINT + 1], buf);
            requantize_short(channel, &bands[SFB_MIXED_SWITCH_POINT..], SFB_MIXED_SWITCH_POINT, buf);
        }
        _ => {
            requantize_long(channel, &SFB_LONG_BANDS[header.sample_rate_idx], buf);
        }
    }
}
