// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::errors::{decode_error, Result};
use cadenza_core::io::ReadBitsLtr;

use crate::common::{ChannelMode, FrameHeader};

use super::{common::*, FrameData, Granule, GranuleChannel};

/// Pairs of scale factor bit lengths (slen1, slen2), indexed by scalefac_compress. The first N
/// scale-factor bands use slen1 bits per scale factor and the remaining bands use slen2, where
/// the switch point N depends on the block type.
const SCALE_FACTOR_SLEN: [(u32, u32); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (3, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
];

/// Reads the side_info for a single channel in a granule.
fn read_granule_channel_side_info<B: ReadBitsLtr>(
    bs: &mut B,
    channel: &mut GranuleChannel,
    header: &FrameHeader,
) -> Result<()> {
    channel.part2_3_length = bs.read_bits_leq32(12)? as u16;
    channel.big_values = bs.read_bits_leq32(9)? as u16;

    // The maximum number of samples in a granule is 576. One big_value decodes to 2 samples,
    // therefore there can be no more than 288 (576/2) big_values.
    if channel.big_values > 288 {
        return decode_error("mpa: granule big_values > 288");
    }

    channel.global_gain = bs.read_bits_leq32(8)? as u8;
    channel.scalefac_compress = bs.read_bits_leq32(4)? as u16;

    let window_switching = bs.read_bool()?;

    if window_switching {
        let block_type_enc = bs.read_bits_leq32(2)?;

        let is_mixed = bs.read_bool()?;

        channel.block_type = match block_type_enc {
            // Only transitional long blocks (Start, End) are allowed with window switching.
            0b00 => return decode_error("mpa: invalid block_type"),
            0b01 => BlockType::Start,
            0b10 => BlockType::Short { is_mixed },
            0b11 => BlockType::End,
            _ => unreachable!(),
        };

        // When window switching is used there are only two regions, and therefore only two
        // table selectors.
        for i in 0..2 {
            channel.table_select[i] = bs.read_bits_leq32(5)? as u8;
        }

        for i in 0..3 {
            channel.subblock_gain[i] = bs.read_bits_leq32(3)? as u8;
        }

        // With window switching the region boundaries are implicit. For MPEG-1, region0 spans
        // the first 8 long scale-factor bands for transitional long blocks, or the first 9 short
        // scale-factor bands for short blocks. In both cases these bands sum to 36 samples.
        channel.region1_start = 36;

        // The second region spans all remaining samples, and region2 is unused.
        channel.region2_start = 576;
    }
    else {
        // If window switching is not used, the block type is always long.
        channel.block_type = BlockType::Long;

        for i in 0..3 {
            channel.table_select[i] = bs.read_bits_leq32(5)? as u8;
        }

        // When window switching is not used, only long scale-factor bands delimit the regions.
        // The stored counts are 1 less than the actual values.
        let region0_count = bs.read_bits_leq32(4)? as usize + 1;
        let region0_1_count = bs.read_bits_leq32(3)? as usize + region0_count + 1;

        channel.region1_start = SFB_LONG_BANDS[header.sample_rate_idx][region0_count];

        // The count in region0_1_count may exceed the last band (22) in the long bands table.
        // Protect against this.
        channel.region2_start = match region0_1_count {
            0..=22 => SFB_LONG_BANDS[header.sample_rate_idx][region0_1_count],
            _ => 576,
        };
    }

    channel.preflag = bs.read_bool()?;
    channel.scalefac_scale = bs.read_bool()?;
    channel.count1table_select = bs.read_bit()? as u8;

    Ok(())
}

/// Reads the side_info for all channels in a granule.
fn read_granule_side_info<B: ReadBitsLtr>(
    bs: &mut B,
    granule: &mut Granule,
    header: &FrameHeader,
) -> Result<()> {
    for channel in &mut granule.channels[..header.channel_mode.count()] {
        read_granule_channel_side_info(bs, channel, header)?;
    }
    Ok(())
}

/// Reads the side_info of a frame into `FrameData` and returns its length in bytes.
pub(super) fn read_side_info<B: ReadBitsLtr>(
    bs: &mut B,
    header: &FrameHeader,
    frame_data: &mut FrameData,
) -> Result<usize> {
    // The first 9 bits are main_data_begin.
    frame_data.main_data_begin = bs.read_bits_leq32(9)? as u16;

    // The next 5 (1 channel) or 3 (2 channel) bits are private and are ignored.
    match header.channel_mode {
        ChannelMode::Mono => bs.ignore_bits(5)?,
        _ => bs.ignore_bits(3)?,
    };

    // The next 4 bits per channel are the SCFSI bits.
    for scfsi in &mut frame_data.scfsi[..header.n_channels()] {
        for band in scfsi.iter_mut() {
            *band = bs.read_bool()?;
        }
    }

    // Read the side_info for each granule.
    for granule in frame_data.granules.iter_mut() {
        read_granule_side_info(bs, granule, header)?;
    }

    Ok(header.side_info_len())
}

/// Reads the scale factors (part2) for a single channel in a granule and returns the number of
/// bits read.
pub(super) fn read_scale_factors<B: ReadBitsLtr>(
    bs: &mut B,
    gr: usize,
    ch: usize,
    frame_data: &mut FrameData,
) -> Result<u32> {
    let mut bits_read = 0;

    let channel = &mut frame_data.granules[gr].channels[ch];

    let (slen1, slen2) = SCALE_FACTOR_SLEN[channel.scalefac_compress as usize];

    // Short or mixed blocks...
    if let BlockType::Short { is_mixed } = channel.block_type {
        // If the block is mixed, the first partition covers the 8 long bands of the mixed
        // region followed by short bands 3..6 with 3 windows each. If the block is not mixed,
        // the first partition covers short bands 0..6 with 3 windows each. Either way each
        // scale factor is slen1 bits long.
        let n_sfb = if is_mixed { 8 + 3 * 3 } else { 6 * 3 };

        if slen1 > 0 {
            for sfb in 0..n_sfb {
                channel.scalefacs[sfb] = bs.read_bits_leq32(slen1)? as u8;
            }
            bits_read += n_sfb as u32 * slen1;
        }

        // The second partition is always short bands 6..12 (mixed or not) with 3 windows each,
        // and each scale factor slen2 bits long.
        if slen2 > 0 {
            for sfb in n_sfb..(n_sfb + 6 * 3) {
                channel.scalefacs[sfb] = bs.read_bits_leq32(slen2)? as u8;
            }
            bits_read += 6 * 3 * slen2;
        }
    }
    // Normal (long, start, end) blocks...
    else {
        // There are 21 long scale-factor bands divided into four groups. The scale factors of
        // the first two groups are slen1 bits long, the last two groups slen2 bits. In granule
        // 1, each group whose SCFSI bit is set re-uses the scale factors of granule 0.
        const SCALE_FACTOR_BANDS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

        for (i, &(start, end)) in SCALE_FACTOR_BANDS.iter().enumerate() {
            let slen = if i < 2 { slen1 } else { slen2 };

            if gr > 0 && frame_data.scfsi[ch][i] {
                let (granule0, granules1) = frame_data.granules.split_first_mut().unwrap();

                granules1[0].channels[ch].scalefacs[start..end]
                    .copy_from_slice(&granule0.channels[ch].scalefacs[start..end]);
            }
            else if slen > 0 {
                for sfb in start..end {
                    frame_data.granules[gr].channels[ch].scalefacs[sfb] =
                        bs.read_bits_leq32(slen)? as u8;
                }
                bits_read += slen * (end - start) as u32;
            }
        }
    }

    Ok(bits_read)
}
