// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cadenza_core::errors::{decode_error, unsupported_error, Result};
use cadenza_core::io::ReadBytes;

use crate::common::*;

/// The length in bytes of a MPEG frame header word.
pub const MPEG_HEADER_LEN: usize = 4;

/// Bit-rate lookup table for MPEG version 1 layer 1.
const BIT_RATES_MPEG1_L1: [u32; 15] = [
    0, 32_000, 64_000, 96_000, 128_000, 160_000, 192_000, 224_000, 256_000, 288_000, 320_000,
    352_000, 384_000, 416_000, 448_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 2.
const BIT_RATES_MPEG1_L2: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000,
    224_000, 256_000, 320_000, 384_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 3.
const BIT_RATES_MPEG1_L3: [u32; 15] = [
    0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000,
    192_000, 224_000, 256_000, 320_000,
];

/// Quickly check if a header word may be the start of a valid frame.
#[inline]
pub fn check_header(header: u32) -> bool {
    // Version (0x1 is reserved).
    if (header >> 19) & 0x3 == 0x1 {
        return false;
    }
    // Layer (0x0 is reserved).
    if (header >> 17) & 0x3 == 0x0 {
        return false;
    }
    // Bitrate (0xf is reserved).
    if (header >> 12) & 0xf == 0xf {
        return false;
    }
    // Sample rate (0x3 is reserved).
    if (header >> 10) & 0x3 == 0x3 {
        return false;
    }
    true
}

/// Returns true if the provided frame header word is synced.
///
/// A MPEG-1 audio frame header always starts at a byte boundary with the 12-bit sync word 0xfff.
#[inline(always)]
pub fn is_frame_header_word_synced(sync: u32) -> bool {
    (sync & 0xfff0_0000) == 0xfff0_0000
}

/// Synchronize the provided reader to the end of the next frame header, and return the frame
/// header word.
pub fn sync_frame<B: ReadBytes>(reader: &mut B) -> Result<u32> {
    let mut sync = 0u32;

    loop {
        // Synchronize the stream to the next frame using the sync word.
        while !is_frame_header_word_synced(sync) {
            sync = (sync << 8) | u32::from(reader.read_u8()?);
        }

        // Random data can look like a sync word. Do a quick check to increase confidence that
        // this may be the start of a frame.
        if check_header(sync) {
            break;
        }

        sync = (sync << 8) | u32::from(reader.read_u8()?);
    }

    Ok(sync)
}

/// Parse a synced frame header word into a `FrameHeader`.
pub fn parse_frame_header(header: u32) -> Result<FrameHeader> {
    // The MPEG audio header is structured as follows:
    //
    // 0b1111_1111 0b111v_vlly 0brrrr_hhpx 0bmmmm_coee
    // where:
    //     vv   = version, ll = layer      , y = crc
    //     rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
    //     mmmm = mode   , c  = copyright  , o = original, ee = emphasis

    let version = match (header & 0x18_0000) >> 19 {
        0b00 => MpegVersion::Mpeg2p5,
        0b10 => MpegVersion::Mpeg2,
        0b11 => MpegVersion::Mpeg1,
        _ => return decode_error("mpa: invalid MPEG version"),
    };

    // Only MPEG-1 frames are decoded. MPEG-2 and 2.5 headers parse far enough to be recognized,
    // after which the frame is skipped.
    if version != MpegVersion::Mpeg1 {
        return unsupported_error("mpa: only MPEG version 1 is supported");
    }

    let layer = match (header & 0x6_0000) >> 17 {
        0b01 => MpegLayer::Layer3,
        0b10 => MpegLayer::Layer2,
        0b11 => MpegLayer::Layer1,
        _ => return decode_error("mpa: invalid MPEG layer"),
    };

    let bitrate = match ((header & 0xf000) >> 12, layer) {
        // "Free" bit-rate. Note, this is NOT variable bit-rate and is not a mandatory feature of
        // MP3 decoders.
        (0b0000, _) => return unsupported_error("mpa: free bit-rate is not supported"),
        // Invalid bit-rate.
        (0b1111, _) => return decode_error("mpa: invalid bit-rate"),
        (i, MpegLayer::Layer1) => BIT_RATES_MPEG1_L1[i as usize],
        (i, MpegLayer::Layer2) => BIT_RATES_MPEG1_L2[i as usize],
        (i, MpegLayer::Layer3) => BIT_RATES_MPEG1_L3[i as usize],
    };

    let (sample_rate, sample_rate_idx) = match (header & 0xc00) >> 10 {
        0b00 => (44_100, 0),
        0b01 => (48_000, 1),
        0b10 => (32_000, 2),
        _ => return decode_error("mpa: invalid sample rate"),
    };

    let channel_mode = match ((header & 0xc0) >> 6, layer) {
        // Stereo, for layers 1, 2, and 3.
        (0b00, _) => ChannelMode::Stereo,
        // Dual mono, for layers 1, 2, and 3.
        (0b10, _) => ChannelMode::DualMono,
        // Mono, for layers 1, 2, and 3.
        (0b11, _) => ChannelMode::Mono,
        // Joint stereo mode for layer 3 supports a combination of Mid-Side and Intensity Stereo
        // depending on the mode extension bits.
        (0b01, MpegLayer::Layer3) => ChannelMode::JointStereo(Mode::Layer3 {
            mid_side: header & 0x20 != 0x0,
            intensity: header & 0x10 != 0x0,
        }),
        // Joint stereo mode for layers 1 and 2 only supports Intensity Stereo. The mode
        // extension bits indicate for which sub-bands intensity stereo coding is applied.
        (0b01, _) => {
            ChannelMode::JointStereo(Mode::Intensity { bound: (1 + ((header & 0x30) >> 4)) << 2 })
        }
        _ => unreachable!(),
    };

    // Some layer 2 channel and bit-rate combinations are not allowed.
    if layer == MpegLayer::Layer2 {
        if channel_mode == ChannelMode::Mono {
            if bitrate >= 224_000 {
                return decode_error("mpa: invalid Layer 2 bitrate for mono channel mode");
            }
        }
        else if bitrate == 32_000 || bitrate == 48_000 || bitrate == 56_000 || bitrate == 80_000 {
            return decode_error("mpa: invalid Layer 2 bitrate for non-mono channel mode");
        }
    }

    let emphasis = match header & 0x3 {
        0b01 => Emphasis::Fifty15,
        0b11 => Emphasis::CcitJ17,
        _ => Emphasis::None,
    };

    let is_copyrighted = header & 0x8 != 0x0;
    let is_original = header & 0x4 != 0x0;
    let has_padding = header & 0x200 != 0;
    let has_crc = header & 0x1_0000 == 0;

    // Constants for the frame size calculation as per ISO/IEC 11172-3 section 2.4.3.1.
    let factor = match layer {
        MpegLayer::Layer1 => 12,
        _ => 144,
    };

    // The header specifies the total frame size in "slots". For layers 2 & 3 a slot is 1 byte,
    // however for layer 1 a slot is 4 bytes. Padding adds one slot.
    let slot_size = match layer {
        MpegLayer::Layer1 => 4,
        _ => 1,
    };

    let frame_size_slots = (factor * bitrate / sample_rate) as usize + usize::from(has_padding);

    // The frame size in bytes, excluding the header.
    let frame_size = (frame_size_slots * slot_size) - MPEG_HEADER_LEN;

    Ok(FrameHeader {
        version,
        layer,
        bitrate,
        sample_rate,
        sample_rate_idx,
        channel_mode,
        emphasis,
        is_copyrighted,
        is_original,
        has_padding,
        has_crc,
        frame_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::io::BufReader;

    #[test]
    fn verify_sync_frame() {
        // Non-sync garbage followed by a valid header word.
        let data = [0x49, 0x44, 0x33, 0x00, 0x7f, 0xff, 0xfb, 0x98, 0x60];
        let mut reader = BufReader::new(&data);

        let sync = sync_frame(&mut reader).unwrap();
        assert_eq!(sync, 0xfffb_9860);
    }

    #[test]
    fn verify_sync_frame_rejects_reserved() {
        // The first candidate sync has a reserved bit-rate index (0xf); the scan must continue
        // to the following valid header.
        let data = [0xff, 0xfb, 0xf8, 0x60, 0xff, 0xfb, 0x98, 0x60];
        let mut reader = BufReader::new(&data);

        let sync = sync_frame(&mut reader).unwrap();
        assert_eq!(sync, 0xfffb_9860);
    }

    #[test]
    fn verify_parse_frame_header() {
        // MPEG-1 Layer III, 128 kbps, 32 kHz, joint stereo (mid-side), no CRC.
        let header = parse_frame_header(0xfffb_9860).unwrap();

        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.layer, MpegLayer::Layer3);
        assert_eq!(header.bitrate, 128_000);
        assert_eq!(header.sample_rate, 32_000);
        assert_eq!(header.sample_rate_idx, 2);
        assert!(!header.has_crc);
        assert!(!header.has_padding);
        assert_eq!(
            header.channel_mode,
            ChannelMode::JointStereo(Mode::Layer3 { mid_side: true, intensity: false })
        );
        // 144 * 128000 / 32000 = 576 bytes, less the 4 byte header.
        assert_eq!(header.frame_size, 572);
        assert_eq!(header.duration(), 1152);
        assert_eq!(header.side_info_len(), 32);
    }

    #[test]
    fn verify_parse_frame_header_layer1() {
        // MPEG-1 Layer I, 32 kbps, 32 kHz, mono, no CRC.
        let header = parse_frame_header(0xffff_18c0).unwrap();

        assert_eq!(header.layer, MpegLayer::Layer1);
        assert_eq!(header.bitrate, 32_000);
        assert_eq!(header.sample_rate, 32_000);
        assert_eq!(header.channel_mode, ChannelMode::Mono);
        // 12 slots of 4 bytes, less the 4 byte header.
        assert_eq!(header.frame_size, 44);
        assert_eq!(header.duration(), 384);
    }

    #[test]
    fn verify_parse_frame_header_rejects_mpeg2() {
        // Version bits 0b10 (MPEG-2) are recognized but not supported.
        assert!(parse_frame_header(0xfff3_9860).is_err());
    }
}
