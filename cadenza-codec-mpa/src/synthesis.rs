// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `synthesis` module implements the polyphase synthesis filterbank of the MPEG audio
//! standard. The filterbank is shared by all layers.

use std::f64;

use lazy_static::lazy_static;

lazy_static! {
    /// The 64x32 matrixing coefficients mapping 32 sub-band samples onto the top of the V
    /// vector, as per ISO/IEC 11172-3 section 2.4.3.2:
    ///
    /// ```text
    /// N[i][j] = cos(PI/64 * (16 + i) * (2*j + 1))
    /// ```
    static ref SYNTHESIS_N: Box<[[f32; 32]; 64]> = {
        const PI_64: f64 = f64::consts::PI / 64.0;

        let mut n = Box::new([[0f32; 32]; 64]);

        for (i, n_i) in n.iter_mut().enumerate() {
            for (j, n_ij) in n_i.iter_mut().enumerate() {
                *n_ij = (PI_64 * ((16 + i) * (2 * j + 1)) as f64).cos() as f32;
            }
        }

        n
    };
}

/// Synthesis window D[i], defined in Table B.3 of ISO/IEC 11172-3.
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
const SYNTHESIS_D: [f32; 512] = [
     0.000000000, -0.000015259, -0.000015259, -0.000015259,
    -0.000015259, -0.000015259, -0.000015259, -0.000030518,
    -0.000030518, -0.000030518, -0.000030518, -0.000045776,
    -0.000045776, -0.000061035, -0.000061035, -0.000076294,
    -0.000076294, -0.000091553, -0.000106812, -0.000106812,
    -0.000122070, -0.000137329, -0.000152588, -0.000167847,
    -0.000198364, -0.000213623, -0.000244141, -0.000259399,
    -0.000289917, -0.000320435, -0.000366211, -0.000396729,
    -0.000442505, -0.000473022, -0.000534058, -0.000579834,
    -0.000625610, -0.000686646, -0.000747681, -0.000808716,
    -0.000885010, -0.000961304, -0.001037598, -0.001113892,
    -0.001205444, -0.001296997, -0.001388550, -0.001480103,
    -0.001586914, -0.001693726, -0.001785278, -0.001907349,
    -0.002014160, -0.002120972, -0.002243042, -0.002349854,
    -0.002456665, -0.002578735, -0.002685547, -0.002792358,
    -0.002899170, -0.002990723, -0.003082275, -0.003173828,
     0.003250122,  0.003326416,  0.003387451,  0.003433228,
     0.003463745,  0.003479004,  0.003479004,  0.003463745,
     0.003417969,  0.003372192,  0.003280640,  0.003173828,
     0.003051758,  0.002883911,  0.002700806,  0.002487183,
     0.002227783,  0.001937866,  0.001617432,  0.001266479,
     0.000869751,  0.000442505, -0.000030518, -0.000549316,
    -0.001098633, -0.001693726, -0.002334595, -0.003005981,
    -0.003723145, -0.004486084, -0.005294800, -0.006118774,
    -0.007003784, -0.007919312, -0.008865356, -0.009841919,
    -0.010848999, -0.011886597, -0.012939453, -0.014022827,
    -0.015121460, -0.016235352, -0.017349243, -0.018463135,
    -0.019577026, -0.020690918, -0.021789551, -0.022857666,
    -0.023910522, -0.024932861, -0.025909424, -0.026840210,
    -0.027725220, -0.028533936, -0.029281616, -0.029937744,
    -0.030532837, -0.031005859, -0.031387329, -0.031661987,
    -0.031814575, -0.031845093, -0.031738281, -0.031478882,
     0.031082153,  0.030517578,  0.029785156,  0.028884888,
     0.027801514,  0.026535034,  0.025085449,  0.023422241,
     0.021575928,  0.019531250,  0.017257690,  0.014801025,
     0.012115479,  0.009231567,  0.006134033,  0.002822876,
    -0.000686646, -0.004394531, -0.008316040, -0.012420654,
    -0.016708374, -0.021179199, -0.025817871, -0.030609131,
    -0.035552979, -0.040634155, -0.045837402, -0.051132202,
    -0.056533813, -0.061996460, -0.067520142, -0.073059082,
    -0.078628540, -0.084182739, -0.089706421, -0.095169067,
    -0.100540161, -0.105819702, -0.110946655, -0.115921021,
    -0.120697021, -0.125259399, -0.129562378, -0.133590698,
    -0.137298584, -0.140670776, -0.143676758, -0.146255493,
    -0.148422241, -0.150115967, -0.151306152, -0.151962280,
    -0.152069092, -0.151596069, -0.150497437, -0.148773193,
    -0.146362305, -0.143264771, -0.139450073, -0.134887695,
    -0.129577637, -0.123474121, -0.116577148, -0.108856201,
     0.100311279,  0.090927124,  0.080688477,  0.069595337,
     0.057617187,  0.044784546,  0.031082153,  0.016510010,
     0.001068115, -0.015228271, -0.032379150, -0.050354004,
    -0.069168091, -0.088775635, -0.109161377, -0.130310059,
    -0.152206421, -0.174789429, -0.198059082, -0.221984863,
    -0.246505737, -0.271591187, -0.297210693, -0.323318481,
    -0.349868774, -0.376800537, -0.404083252, -0.431655884,
    -0.459472656, -0.487472534, -0.515609741, -0.543823242,
    -0.572036743, -0.600219727, -0.628295898, -0.656219482,
    -0.683914185, -0.711318970, -0.738372803, -0.765029907,
    -0.791213989, -0.816864014, -0.841949463, -0.866363525,
    -0.890090942, -0.913055420, -0.935195923, -0.956481934,
    -0.976852417, -0.996246338, -1.014617920, -1.031936646,
    -1.048156738, -1.063217163, -1.077117920, -1.089782715,
    -1.101211548, -1.111373901, -1.120223999, -1.127746582,
    -1.133926392, -1.138763428, -1.142211914, -1.144287109,
     1.144989014,  1.144287109,  1.142211914,  1.138763428,
     1.133926392,  1.127746582,  1.120223999,  1.111373901,
     1.101211548,  1.089782715,  1.077117920,  1.063217163,
     1.048156738,  1.031936646,  1.014617920,  0.996246338,
     0.976852417,  0.956481934,  0.935195923,  0.913055420,
     0.890090942,  0.866363525,  0.841949463,  0.816864014,
     0.791213989,  0.765029907,  0.738372803,  0.711318970,
     0.683914185,  0.656219482,  0.628295898,  0.600219727,
     0.572036743,  0.543823242,  0.515609741,  0.487472534,
     0.459472656,  0.431655884,  0.404083252,  0.376800537,
     0.349868774,  0.323318481,  0.297210693,  0.271591187,
     0.246505737,  0.221984863,  0.198059082,  0.174789429,
     0.152206421,  0.130310059,  0.109161377,  0.088775635,
     0.069168091,  0.050354004,  0.032379150,  0.015228271,
    -0.001068115, -0.016510010, -0.031082153, -0.044784546,
    -0.057617187, -0.069595337, -0.080688477, -0.090927124,
     0.100311279,  0.108856201,  0.116577148,  0.123474121,
     0.129577637,  0.134887695,  0.139450073,  0.143264771,
     0.146362305,  0.148773193,  0.150497437,  0.151596069,
     0.152069092,  0.151962280,  0.151306152,  0.150115967,
     0.148422241,  0.146255493,  0.143676758,  0.140670776,
     0.137298584,  0.133590698,  0.129562378,  0.125259399,
     0.120697021,  0.115921021,  0.110946655,  0.105819702,
     0.100540161,  0.095169067,  0.089706421,  0.084182739,
     0.078628540,  0.073059082,  0.067520142,  0.061996460,
     0.056533813,  0.051132202,  0.045837402,  0.040634155,
     0.035552979,  0.030609131,  0.025817871,  0.021179199,
     0.016708374,  0.012420654,  0.008316040,  0.004394531,
     0.000686646, -0.002822876, -0.006134033, -0.009231567,
    -0.012115479, -0.014801025, -0.017257690, -0.019531250,
    -0.021575928, -0.023422241, -0.025085449, -0.026535034,
    -0.027801514, -0.028884888, -0.029785156, -0.030517578,
     0.031082153,  0.031478882,  0.031738281,  0.031845093,
     0.031814575,  0.031661987,  0.031387329,  0.031005859,
     0.030532837,  0.029937744,  0.029281616,  0.028533936,
     0.027725220,  0.026840210,  0.025909424,  0.024932861,
     0.023910522,  0.022857666,  0.021789551,  0.020690918,
     0.019577026,  0.018463135,  0.017349243,  0.016235352,
     0.015121460,  0.014022827,  0.012939453,  0.011886597,
     0.010848999,  0.009841919,  0.008865356,  0.007919312,
     0.007003784,  0.006118774,  0.005294800,  0.004486084,
     0.003723145,  0.003005981,  0.002334595,  0.001693726,
     0.001098633,  0.000549316,  0.000030518, -0.000442505,
    -0.000869751, -0.001266479, -0.001617432, -0.001937866,
    -0.002227783, -0.002487183, -0.002700806, -0.002883911,
    -0.003051758, -0.003173828, -0.003280640, -0.003372192,
    -0.003417969, -0.003463745, -0.003479004, -0.003479004,
    -0.003463745, -0.003433228, -0.003387451, -0.003326416,
     0.003250122,  0.003173828,  0.003082275,  0.002990723,
     0.002899170,  0.002792358,  0.002685547,  0.002578735,
     0.002456665,  0.002349854,  0.002243042,  0.002120972,
     0.002014160,  0.001907349,  0.001785278,  0.001693726,
     0.001586914,  0.001480103,  0.001388550,  0.001296997,
     0.001205444,  0.001113892,  0.001037598,  0.000961304,
     0.000885010,  0.000808716,  0.000747681,  0.000686646,
     0.000625610,  0.000579834,  0.000534058,  0.000473022,
     0.000442505,  0.000396729,  0.000366211,  0.000320435,
     0.000289917,  0.000259399,  0.000244141,  0.000213623,
     0.000198364,  0.000167847,  0.000152588,  0.000137329,
     0.000122070,  0.000106812,  0.000106812,  0.000091553,
     0.000076294,  0.000076294,  0.000061035,  0.000061035,
     0.000045776,  0.000045776,  0.000030518,  0.000030518,
     0.000030518,  0.000030518,  0.000015259,  0.000015259,
     0.000015259,  0.000015259,  0.000015259,  0.000015259,
];

/// `SynthesisState` maintains the persistent state of sub-band synthesis.
pub struct SynthesisState {
    v: Box<[f32; 1024]>,
}

impl Default for SynthesisState {
    fn default() -> Self {
        SynthesisState { v: Box::new([0f32; 1024]) }
    }
}

/// Sub-band synthesis transforms `n_frames` blocks of 32 time-domain sub-band samples each into
/// `n_frames` blocks of 32 PCM audio samples.
///
/// `in_samples` is in sub-band major order: the b-th sample of sub-band j is at
/// `in_samples[n_frames * j + b]`. For each of the `n_frames` steps, the V vector is shifted
/// back by 64 entries, the next 32 sub-band samples are matrixed through N into the front of V,
/// and 32 output samples are produced by windowing 16 partial blocks of V with the D window and
/// folding them together.
pub fn synthesis(state: &mut SynthesisState, n_frames: usize, in_samples: &[f32], out: &mut [f32]) {
    assert!(in_samples.len() == 32 * n_frames);
    assert!(out.len() == 32 * n_frames);

    let n_mat: &[[f32; 32]; 64] = &SYNTHESIS_N;

    for b in 0..n_frames {
        let v = &mut *state.v;

        // Shift the V vector back by 64 entries. The oldest 64 entries fall away.
        v.copy_within(0..960, 64);

        // Gather the b-th sample from each of the 32 sub-bands.
        let mut s_vec = [0f32; 32];
        for (j, s) in s_vec.iter_mut().enumerate() {
            *s = in_samples[n_frames * j + b];
        }

        // Matrix the 32 sub-band samples through N into the front of V.
        for (v, n_i) in v[..64].iter_mut().zip(n_mat.iter()) {
            let mut sum = 0.0;
            for (s, n_ij) in s_vec.iter().zip(n_i.iter()) {
                sum += s * n_ij;
            }
            *v = sum;
        }

        // As per the standard, a 512 sample U vector is built by gathering the first 32 samples
        // of the even 64-sample segments of V and the last 32 samples of the odd segments, then
        // a W vector is formed by multiplying U by the D window, and finally each output sample
        // is the sum of 16 W samples spaced 32 apart:
        //
        //         15
        // s[j] = SUM { W[32*i + j] }    for j = 0..32
        //        i=0
        //
        // The U and W vectors are not materialized; the windowed partial sums are accumulated
        // directly into the output block.
        let mut o_vec = [0f32; 32];

        for i in 0..8 {
            for j in 0..32 {
                o_vec[j] += v[128 * i + j] * SYNTHESIS_D[64 * i + j];
                o_vec[j] += v[128 * i + 96 + j] * SYNTHESIS_D[64 * i + 32 + j];
            }
        }

        // Clamp and copy the PCM samples into the output buffer.
        for (o, s) in out[32 * b..32 * (b + 1)].iter_mut().zip(&o_vec) {
            *o = s.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_synthesis_n_matrix() {
        let n: &[[f32; 32]; 64] = &SYNTHESIS_N;

        // Spot check the matrix against its defining equation.
        assert!((n[0][0] - (std::f64::consts::PI / 64.0 * 16.0).cos() as f32).abs() < 1e-7);
        assert!((n[5][7] - (std::f64::consts::PI / 64.0 * (21.0 * 15.0)).cos() as f32).abs() < 1e-7);

        // Row 16 is cos(PI/2 * (2j + 1)) = 0 for every j, and row 48 is cos(PI * (2j + 1)) = -1.
        assert!(n[16].iter().all(|&x| x.abs() < 1e-6));
        assert!(n[48].iter().all(|&x| (x + 1.0).abs() < 1e-6));
    }

    #[test]
    fn verify_synthesis_d_window() {
        // The window is zero at its first tap and anti-symmetric in magnitude around its centre
        // taps, with the peak magnitude at the centre.
        assert_eq!(SYNTHESIS_D[0], 0.0);

        let peak = SYNTHESIS_D.iter().fold(0f32, |acc, &d| acc.max(d.abs()));
        assert!((peak - 1.144989014).abs() < 1e-6);
        assert_eq!(SYNTHESIS_D[256], 1.144989014);
    }

    #[test]
    fn verify_synthesis_of_silence() {
        let mut state = SynthesisState::default();

        let in_samples = [0f32; 32 * 12];
        let mut out = [1f32; 32 * 12];

        synthesis(&mut state, 12, &in_samples, &mut out);

        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_synthesis_first_step() {
        // For the very first step on a zeroed V vector, only segment 0 of V is non-zero, so
        // output sample j reduces to V[j] * D[j] + V[96 + j] * D[32 + j].
        let mut state = SynthesisState::default();

        let mut in_samples = [0f32; 32 * 1];
        in_samples[0] = 1.0;

        let mut out = [0f32; 32];
        synthesis(&mut state, 1, &in_samples, &mut out);

        let n: &[[f32; 32]; 64] = &SYNTHESIS_N;

        // With only sub-band 0 active, V[i] = N[i][0] for i < 64 and V[96 + j] is still zero, so
        // the output reduces to V[j] * D[j]. In particular, since D[0] = 0, the very first
        // output sample of a stream is 0.
        assert!((out[0] - n[0][0] * SYNTHESIS_D[0]).abs() < 1e-7);
        assert_eq!(out[0], 0.0);

        for j in 0..32 {
            let expected = n[j][0] * SYNTHESIS_D[j];
            assert!((out[j] - expected).abs() < 1e-6);
        }
    }
}
