// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::f64;

use lazy_static::lazy_static;

use crate::common::FrameHeader;

use super::{common::*, GranuleChannel};

lazy_static! {
    /// Hybrid synthesis IMDCT window coefficients for Long, Start, Short, and End blocks, in
    /// that order.
    ///
    /// For long blocks:
    ///
    /// ```text
    /// W[ 0..36] = sin(PI/36.0 * (i + 0.5))
    /// ```
    ///
    /// For start blocks:
    ///
    /// ```text
    /// W[ 0..18] = sin(PI/36.0 * (i + 0.5))
    /// W[18..24] = 1.0
    /// W[24..30] = sin(PI/12.0 * ((i - 18) + 0.5))
    /// W[30..36] = 0.0
    /// ```
    ///
    /// For short blocks (applied to each 12 sample window):
    ///
    /// ```text
    /// W[ 0..12] = sin(PI/12.0 * (i + 0.5))
    /// W[12..36] = 0.0
    /// ```
    ///
    /// For end blocks:
    ///
    /// ```text
    /// W[ 0..6 ] = 0.0
    /// W[ 6..12] = sin(PI/12.0 * ((i - 6) + 0.5))
    /// W[12..18] = 1.0
    /// W[18..36] = sin(PI/36.0 * (i + 0.5))
    /// ```
    static ref IMDCT_WINDOWS: [[f32; 36]; 4] = {
        const PI_36: f64 = f64::consts::PI / 36.0;
        const PI_12: f64 = f64::consts::PI / 12.0;

        let mut windows = [[0f32; 36]; 4];

        // Window for Long blocks.
        for i in 0..36 {
            windows[0][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }

        // Window for Start blocks (indices 30..36 implicitly 0.0).
        for i in 0..18 {
            windows[1][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }
        for i in 18..24 {
            windows[1][i] = 1.0;
        }
        for i in 24..30 {
            windows[1][i] = (PI_12 * ((i - 18) as f64 + 0.5)).sin() as f32;
        }

        // Window for Short blocks.
        for i in 0..12 {
            windows[2][i] = (PI_12 * (i as f64 + 0.5)).sin() as f32;
        }

        // Window for End blocks (indices 0..6 implicitly 0.0).
        for i in 6..12 {
            windows[3][i] = (PI_12 * ((i - 6) as f64 + 0.5)).sin() as f32;
        }
        for i in 12..18 {
            windows[3][i] = 1.0;
        }
        for i in 18..36 {
            windows[3][i] = (PI_36 * (i as f64 + 0.5)).sin() as f32;
        }

        windows
    };
}

lazy_static! {
    /// Cosine twiddle factors for the 36-point IMDCT.
    ///
    /// ```text
    /// cos36[i][k] = cos(PI/72.0 * (2*i + 1 + 18) * (2*k + 1))
    /// ```
    static ref IMDCT_COS_36: [[f32; 18]; 36] = {
        const PI_72: f64 = f64::consts::PI / 72.0;

        let mut cos = [[0f32; 18]; 36];

        for (i, cos_i) in cos.iter_mut().enumerate() {
            for (k, cos_ik) in cos_i.iter_mut().enumerate() {
                *cos_ik = (PI_72 * ((2 * i + 1 + 18) * (2 * k + 1)) as f64).cos() as f32;
            }
        }

        cos
    };

    /// Cosine twiddle factors for the 12-point IMDCT.
    ///
    /// ```text
    /// cos12[i][k] = cos(PI/24.0 * (2*i + 1 + 6) * (2*k + 1))
    /// ```
    static ref IMDCT_COS_12: [[f32; 6]; 12] = {
        const PI_24: f64 = f64::consts::PI / 24.0;

        let mut cos = [[0f32; 6]; 12];

        for (i, cos_i) in cos.iter_mut().enumerate() {
            for (k, cos_ik) in cos_i.iter_mut().enumerate() {
                *cos_ik = (PI_24 * ((2 * i + 1 + 6) * (2 * k + 1)) as f64).cos() as f32;
            }
        }

        cos
    };
}

lazy_static! {
    /// Pair of lookup tables, CS and CA, for alias reduction.
    ///
    /// As per ISO/IEC 11172-3, CS and CA are calculated as follows:
    ///
    /// ```text
    /// cs[i] =  1.0 / sqrt(1.0 + c[i]^2)
    /// ca[i] = c[i] / sqrt(1.0 + c[i]^2)
    /// ```
    ///
    /// where:
    /// ```text
    /// c[i] = [ -0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037 ]
    /// ```
    static ref ANTIALIAS_CS_CA: ([f32; 8], [f32; 8]) = {
        const C: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

        let mut cs = [0f32; 8];
        let mut ca = [0f32; 8];

        for i in 0..8 {
            let sqrt = f64::sqrt(1.0 + (C[i] * C[i]));
            cs[i] = (1.0 / sqrt) as f32;
            ca[i] = (C[i] / sqrt) as f32;
        }

        (cs, ca)
    };
}

/// Reorders the samples of short blocks into sub-band order.
///
/// Each short scale-factor band is coded as three windows back-to-back:
///
/// ```text
///    <- Window #1 ->  <- Window #2 ->  <- Window #3 ->
///   [ 0 | 1 | 2 | 3 ][ 4 | 5 | 6 | 7 ][ 8 | 9 | a | b ]
/// ```
///
/// Reordering interleaves the windows sample-by-sample:
///
/// ```text
///   [ 0 | 4 | 8 | 1 | 5 | 9 | 2 | 6 | a | 3 | 7 | b ]
/// ```
pub(super) fn reorder(header: &FrameHeader, channel: &GranuleChannel, buf: &mut [f32; 576]) {
    // Only short blocks are reordered.
    if let BlockType::Short { is_mixed } = channel.block_type {
        // In mixed blocks, only the short bands are reordered. The long region is skipped.
        let bands = if is_mixed {
            &SFB_MIXED_BANDS[header.sample_rate_idx][SFB_MIXED_SWITCH_POINT..]
        }
        else {
            &SFB_SHORT_BANDS[header.sample_rate_idx][..]
        };

        let start = bands[0];

        let mut reorder_buf = [0f32; 576];

        let mut i = start;

        // Iterate over the three windows of each short band.
        for (((s0, s1), s2), s3) in
            bands.iter().zip(&bands[1..]).zip(&bands[2..]).zip(&bands[3..]).step_by(3)
        {
            let win0 = &buf[*s0..*s1];
            let win1 = &buf[*s1..*s2];
            let win2 = &buf[*s2..*s3];

            for ((w0, w1), w2) in win0.iter().zip(win1).zip(win2) {
                reorder_buf[i + 0] = *w0;
                reorder_buf[i + 1] = *w1;
                reorder_buf[i + 2] = *w2;
                i += 3;
            }
        }

        buf[start..i].copy_from_slice(&reorder_buf[start..i]);
    }
}

/// Applies the anti-aliasing butterflies to the boundaries of sub-bands that are not part of
/// short blocks.
pub(super) fn antialias(channel: &GranuleChannel, samples: &mut [f32; 576]) {
    // The number of sub-bands to anti-alias depends on the block type.
    let sb_end = match channel.block_type {
        // Short blocks are never anti-aliased.
        BlockType::Short { is_mixed: false } => return,
        // Mixed blocks have a long block spanning the first 36 samples (2 sub-bands), so only
        // the boundary between those two sub-bands is processed.
        BlockType::Short { is_mixed: true } => 2 * 18,
        // All other block types process all 32 sub-band boundaries.
        _ => 32 * 18,
    };

    let (cs, ca): &([f32; 8], [f32; 8]) = &ANTIALIAS_CS_CA;

    // Eight butterfly calculations are performed at the boundary of each pair of adjacent
    // sub-bands. For each iteration, the lower sample index advances backwards from the
    // boundary while the upper index advances forward:
    //
    //              * cs[i]
    //   l0 -------o------(-)------> l1
    //               \    /                  l1 = l0 * cs[i] - u0 * ca[i]
    //                \  / * ca[i]           u1 = u0 * cs[i] + l0 * ca[i]
    //                 \
    //               /  \  * ca[i]
    //             /     \
    //   u0 ------o------(+)-------> u1
    //
    // Both outputs are computed from the saved inputs; the upper output must not observe the
    // already-updated lower sample.
    for sb in (18..sb_end).step_by(18) {
        for i in 0..8 {
            let li = sb - 1 - i;
            let ui = sb + i;
            let lower = samples[li];
            let upper = samples[ui];

            samples[li] = lower * cs[i] - upper * ca[i];
            samples[ui] = upper * cs[i] + lower * ca[i];
        }
    }
}

/// Performs the 36-point IMDCT on one sub-band, windows the output, and overlap-adds it with the
/// previous granule's tail.
///
/// The IMDCT is computed in its direct form:
///
/// ```text
///        N/2-1
/// y[i] =  SUM  { x[k] * cos(PI/2N * (2*i + 1 + N/2) * (2*k + 1)) }      N = 36
///         k=0
/// ```
///
/// The first half of the windowed output is overlap-added onto `overlap` and written back to
/// `x`; the second half becomes the new `overlap`.
fn imdct36(x: &mut [f32; 18], window: &[f32; 36], overlap: &mut [f32; 18]) {
    let cos36: &[[f32; 18]; 36] = &IMDCT_COS_36;

    let mut block = [0f32; 36];

    for i in 0..36 {
        let mut sum = 0.0;
        for k in 0..18 {
            sum += x[k] * cos36[i][k];
        }
        block[i] = sum * window[i];
    }

    for i in 0..18 {
        x[i] = block[i] + overlap[i];
        overlap[i] = block[i + 18];
    }
}

/// Performs the 12-point IMDCT and windowing for each of the 3 short windows of a short block
/// sub-band, and then overlap-adds the result.
///
/// The three 12-sample window outputs overlap by 6 samples inside the 36-sample block, and the
/// first and last 6 samples of the block are always 0:
///
/// ```text
/// 0             6            12           18           24           30            36
/// +-------------+------------+------------+------------+------------+-------------+
/// |      0      |  w0[0..6]  |  w0[6..]   |  w1[6..]   |  w2[6..]   |      0      |
/// |     (6)     |            |  + w1[..6] |  + w2[..6] |            |     (6)     |
/// +-------------+------------+------------+------------+------------+-------------+
/// ```
fn imdct12_win(x: &mut [f32; 18], window: &[f32; 36], overlap: &mut [f32; 18]) {
    let cos12: &[[f32; 6]; 12] = &IMDCT_COS_12;

    let mut block = [0f32; 36];

    for w in 0..3 {
        for i in 0..12 {
            // The input samples of each window are interleaved in the sub-band.
            let mut sum = 0.0;
            for k in 0..6 {
                sum += x[3 * k + w] * cos12[i][k];
            }

            block[6 * w + i + 6] += sum * window[i];
        }
    }

    for i in 0..18 {
        x[i] = block[i] + overlap[i];
        overlap[i] = block[i + 18];
    }
}

/// Performs hybrid synthesis (IMDCT and windowing) over all 32 sub-bands.
pub(super) fn hybrid_synthesis(
    channel: &GranuleChannel,
    overlap: &mut [[f32; 18]; 32],
    samples: &mut [f32; 576],
) {
    // Short blocks process 0 sub-bands as long blocks, mixed blocks the first 2 sub-bands, and
    // all other block types process all 32 sub-bands as long blocks.
    let n_long_bands = match channel.block_type {
        BlockType::Short { is_mixed: false } => 0,
        BlockType::Short { is_mixed: true } => 2,
        _ => 32,
    };

    if n_long_bands > 0 {
        let window: &[f32; 36] = match channel.block_type {
            BlockType::Start => &IMDCT_WINDOWS[1],
            BlockType::End => &IMDCT_WINDOWS[3],
            _ => &IMDCT_WINDOWS[0],
        };

        for sb in 0..n_long_bands {
            let start = 18 * sb;
            let sub_band: &mut [f32; 18] = (&mut samples[start..start + 18]).try_into().unwrap();

            imdct36(sub_band, window, &mut overlap[sb]);
        }
    }

    // Process any remaining sub-bands as short blocks using the 12-point IMDCT on each window.
    if n_long_bands < 32 {
        let window: &[f32; 36] = &IMDCT_WINDOWS[2];

        for sb in n_long_bands..32 {
            let start = 18 * sb;
            let sub_band: &mut [f32; 18] = (&mut samples[start..start + 18]).try_into().unwrap();

            imdct12_win(sub_band, window, &mut overlap[sb]);
        }
    }
}

/// Negates every odd sample in every odd sub-band to undo the frequency inversion of the
/// polyphase filterbank.
pub(super) fn frequency_inversion(samples: &mut [f32; 576]) {
    for sb in (1..32).step_by(2) {
        for i in (1..18).step_by(2) {
            samples[18 * sb + i] = -samples[18 * sb + i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    #[test]
    fn verify_antialias_constants() {
        let (cs, ca) = &*ANTIALIAS_CS_CA;

        // The butterfly coefficients form a rotation: cs^2 + ca^2 = 1.
        for i in 0..8 {
            assert!((cs[i] * cs[i] + ca[i] * ca[i] - 1.0).abs() < 1e-6);
        }

        assert!((cs[0] - 0.857_492_9).abs() < 1e-6);
        assert!((ca[0] - -0.514_495_8).abs() < 1e-6);
    }

    #[test]
    fn verify_antialias_butterfly() {
        // The butterfly must use the original lower sample when computing the upper output.
        let channel = GranuleChannel::default();

        let mut samples = [0f32; 576];
        samples[17] = 1.0;
        samples[18] = 1.0;

        antialias(&channel, &mut samples);

        let (cs, ca) = &*ANTIALIAS_CS_CA;
        assert!((samples[17] - (cs[0] - ca[0])).abs() < 1e-6);
        assert!((samples[18] - (cs[0] + ca[0])).abs() < 1e-6);
    }

    #[test]
    fn verify_imdct36() {
        const TEST_VECTOR: [f32; 18] = [
            0.0976, 0.9321, 0.6138, 0.0857, 0.0433, 0.4855, 0.2144, 0.8488, //
            0.6889, 0.2983, 0.1957, 0.7037, 0.0052, 0.0197, 0.3188, 0.5123, //
            0.2994, 0.7157,
        ];

        // Compute the expected output analytically in f64.
        let mut expected = [0f32; 36];
        for i in 0..36 {
            let mut sum = 0.0f64;
            for k in 0..18 {
                sum += f64::from(TEST_VECTOR[k])
                    * (f64::consts::PI / 72.0 * ((2 * i + 1 + 18) * (2 * k + 1)) as f64).cos();
            }
            expected[i] = sum as f32;
        }

        const WINDOW: [f32; 36] = [1.0; 36];

        let mut actual = TEST_VECTOR;
        let mut overlap = [0.0f32; 18];
        imdct36(&mut actual, &WINDOW, &mut overlap);

        for i in 0..18 {
            assert!((expected[i] - actual[i]).abs() < 0.00001);
            assert!((expected[i + 18] - overlap[i]).abs() < 0.00001);
        }
    }

    #[test]
    fn verify_imdct36_overlap_add() {
        let mut x = [0f32; 18];
        x[0] = 1.0;

        let mut overlap = [0.5f32; 18];
        let window = [1.0f32; 36];

        let mut direct = [0f32; 36];
        for i in 0..36 {
            direct[i] = (f64::consts::PI / 72.0 * ((2 * i + 1 + 18) as f64)).cos() as f32;
        }

        imdct36(&mut x, &window, &mut overlap);

        for i in 0..18 {
            assert!((x[i] - (direct[i] + 0.5)).abs() < 1e-6);
            assert!((overlap[i] - direct[i + 18]).abs() < 1e-6);
        }
    }

    #[test]
    fn verify_imdct12_win() {
        const TEST_VECTOR: [f32; 18] = [
            0.0976, 0.9321, 0.6138, 0.0857, 0.0433, 0.4855, 0.2144, 0.8488, //
            0.6889, 0.2983, 0.1957, 0.7037, 0.0052, 0.0197, 0.3188, 0.5123, //
            0.2994, 0.7157,
        ];

        let window = &IMDCT_WINDOWS[2];

        let mut actual = TEST_VECTOR;
        let mut overlap = [0.0f32; 18];
        imdct12_win(&mut actual, window, &mut overlap);

        // Perform three analytical 12-point IMDCTs over the deinterleaved windows of the test
        // vector, then window and overlap the outputs.
        let expected = {
            let mut expected = [0f32; 36];

            for w in 0..3 {
                for i in 0..12 {
                    let mut sum = 0.0f64;
                    for k in 0..6 {
                        sum += f64::from(TEST_VECTOR[3 * k + w])
                            * (f64::consts::PI / 24.0 * ((2 * i + 1 + 6) * (2 * k + 1)) as f64)
                                .cos();
                    }
                    expected[6 + 6 * w + i] += sum as f32 * window[i];
                }
            }

            expected
        };

        for i in 0..18 {
            assert!((expected[i] - actual[i]).abs() < 0.00001);
            assert!((expected[i + 18] - overlap[i]).abs() < 0.00001);
        }
    }

    #[test]
    fn verify_imdct_windows() {
        let windows = &*IMDCT_WINDOWS;

        // The start and end windows are time-reversals of each other.
        for i in 0..36 {
            assert!((windows[1][i] - windows[3][35 - i]).abs() < 1e-6);
        }

        // The short window spans only the first 12 samples.
        assert!(windows[2][..12].iter().all(|&w| w > 0.0));
        assert!(windows[2][12..].iter().all(|&w| w == 0.0));
    }

    #[test]
    fn verify_reorder_short_block() {
        // 44.1 kHz short blocks: the first band has a window length of 4. After reordering, the
        // windows of the band are interleaved sample-by-sample.
        let header = parse_frame_header(0xfffb_90c0).unwrap();

        let channel = GranuleChannel {
            block_type: BlockType::Short { is_mixed: false },
            rzero: 576,
            ..Default::default()
        };

        let mut buf = [0f32; 576];
        for (i, sample) in buf.iter_mut().enumerate().take(12) {
            *sample = i as f32;
        }

        reorder(&header, &channel, &mut buf);

        assert_eq!(
            &buf[..12],
            &[0.0, 4.0, 8.0, 1.0, 5.0, 9.0, 2.0, 6.0, 10.0, 3.0, 7.0, 11.0]
        );
    }

    #[test]
    fn verify_frequency_inversion() {
        let mut samples = [1f32; 576];
        frequency_inversion(&mut samples);

        for sb in 0..32 {
            for i in 0..18 {
                let expected = if sb % 2 == 1 && i % 2 == 1 { -1.0 } else { 1.0 };
                assert_eq!(samples[18 * sb + i], expected);
            }
        }
    }
}
