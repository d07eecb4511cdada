// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f32;

use cadenza_core::errors::{decode_error, Result};

use crate::common::{ChannelMode, FrameHeader, Mode};

use super::Granule;

use log::warn;

/// Decorrelates mid and side channels into left and right channels.
///
/// In mid-side (MS) stereo, the left and right channels are encoded as average (mid) and
/// difference (side) components:
///
/// ```text
/// l[i] = (m[i] + s[i]) / sqrt(2)
/// r[i] = (m[i] - s[i]) / sqrt(2)
/// ```
///
/// The mid channel is transmitted in channel 0 and the side channel in channel 1. After
/// decoding, the left channel replaces the mid channel and the right channel the side channel.
fn process_mid_side(mid: &mut [f32], side: &mut [f32]) {
    debug_assert!(mid.len() == side.len());

    for (m, s) in mid.iter_mut().zip(side) {
        let left = (*m + *s) * f32::consts::FRAC_1_SQRT_2;
        let right = (*m - *s) * f32::consts::FRAC_1_SQRT_2;
        *m = left;
        *s = right;
    }
}

/// Performs joint stereo processing on the channel pair of a granule.
pub(super) fn stereo(
    header: &FrameHeader,
    granule: &Granule,
    ch: &mut [[f32; 576]; 2],
) -> Result<()> {
    let (mid_side, intensity) = match header.channel_mode {
        ChannelMode::JointStereo(Mode::Layer3 { mid_side, intensity }) => (mid_side, intensity),
        ChannelMode::JointStereo(Mode::Intensity { .. }) => {
            // The layer 1 & 2 mode extension is never attached to a layer 3 frame header.
            return decode_error("mpa: invalid mode extension for layer 3 stereo decoding");
        }
        _ => return Ok(()),
    };

    // The channels of a stereo pair must code the same block type.
    if granule.channels[0].block_type != granule.channels[1].block_type {
        return decode_error("mpa: stereo channel pair block_type mismatch");
    }

    // Intensity stereo coded bands are not decoded. The spectrum is emitted as-is (after
    // mid-side processing, if that is also enabled) rather than failing the frame.
    if intensity {
        warn!("mpa: intensity stereo is not supported, channel separation will be degraded");
    }

    if mid_side {
        let (ch0, ch1) = {
            let (ch0, ch1) = ch.split_first_mut().unwrap();
            (ch0, &mut ch1[0])
        };

        process_mid_side(ch0, ch1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::process_mid_side;

    #[test]
    fn verify_process_mid_side() {
        let mut mid = [2.0f32, 0.0, 1.0];
        let mut side = [0.0f32, 2.0, 1.0];

        process_mid_side(&mut mid, &mut side);

        let sqrt2 = std::f32::consts::SQRT_2;

        // Equal mid and side fold entirely into the left channel, a zero side channel splits
        // the mid equally, and vice versa.
        assert!((mid[0] - sqrt2).abs() < 1e-6);
        assert!((side[0] - sqrt2).abs() < 1e-6);
        assert!((mid[1] - sqrt2).abs() < 1e-6);
        assert!((side[1] + sqrt2).abs() < 1e-6);
        assert!((mid[2] - sqrt2).abs() < 1e-6);
        assert!(side[2].abs() < 1e-6);
    }
}
