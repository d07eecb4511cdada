// Cadenza
// Copyright (c) 2025 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end decoder tests over synthetic, hand-assembled MPEG-1 audio frames.

use std::f64::consts::PI;

use cadenza_codec_mpa::MpaDecoder;

/// A minimal MSB-first bit writer for assembling frames.
struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    n_bits: u32,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter { bytes: Vec::new(), acc: 0, n_bits: 0 }
    }

    fn put(&mut self, width: u32, value: u32) {
        assert!(width == 32 || u64::from(value) < (1u64 << width));
        self.acc = (self.acc << width) | u64::from(value);
        self.n_bits += width;
        while self.n_bits >= 8 {
            self.n_bits -= 8;
            self.bytes.push((self.acc >> self.n_bits) as u8);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.n_bits > 0 {
            let pad = 8 - self.n_bits;
            self.put(pad, 0);
        }
        self.bytes
    }
}

/// MPEG-1 Layer III, 128 kbps, 32 kHz, mono, no CRC. The frame is 576 bytes in total.
const HDR_L3_MONO: u32 = 0xfffb_98c0;

/// MPEG-1 Layer III, 128 kbps, 32 kHz, joint stereo with the mid-side bit set, no CRC.
const HDR_L3_JOINT_MS: u32 = 0xfffb_9860;

/// MPEG-1 Layer I, 32 kbps, 32 kHz, mono, no CRC. The frame is 48 bytes in total.
const HDR_L1_MONO: u32 = 0xffff_18c0;

/// Side info fields for one granule channel.
#[derive(Copy, Clone, Default)]
struct GranuleSpec {
    part2_3_length: u32,
    big_values: u32,
    global_gain: u32,
    table_select: u32,
}

fn write_granule_channel(bw: &mut BitWriter, spec: &GranuleSpec) {
    bw.put(12, spec.part2_3_length);
    bw.put(9, spec.big_values);
    bw.put(8, spec.global_gain);
    bw.put(4, 0); // scalefac_compress
    bw.put(1, 0); // window_switching_flag
    bw.put(5, spec.table_select);
    bw.put(5, 0);
    bw.put(5, 0);
    bw.put(4, 0); // region0_count
    bw.put(3, 0); // region1_count
    bw.put(1, 0); // preflag
    bw.put(1, 0); // scalefac_scale
    bw.put(1, 0); // count1table_select
}

/// Assembles a complete Layer III frame. `gr_ch` holds one entry per granule per channel in
/// transmission order, and `main_data` is zero-padded out to the frame length.
fn layer3_frame(
    header: u32,
    main_data_begin: u32,
    gr_ch: &[GranuleSpec],
    main_data: &[u8],
) -> Vec<u8> {
    let n_channels = gr_ch.len() / 2;
    assert!(gr_ch.len() == 2 * n_channels);

    let mut bw = BitWriter::new();
    bw.put(9, main_data_begin);
    bw.put(if n_channels == 1 { 5 } else { 3 }, 0); // private_bits
    for _ in 0..n_channels {
        bw.put(4, 0); // scfsi
    }
    for spec in gr_ch {
        write_granule_channel(&mut bw, spec);
    }

    let side_info = bw.finish();
    assert_eq!(side_info.len(), if n_channels == 1 { 17 } else { 32 });

    // 144 * 128000 / 32000 = 576 bytes in total.
    let mut frame = header.to_be_bytes().to_vec();
    frame.extend_from_slice(&side_info);
    frame.extend_from_slice(main_data);
    frame.resize(576, 0);
    frame
}

/// A mono frame carrying a single spectral line: granule 0 decodes one (x=1, y=0) pair from
/// Huffman table 1 with a positive sign and unity gain, granule 1 is empty.
fn single_line_frame() -> Vec<u8> {
    let gr0 = GranuleSpec {
        part2_3_length: 3,
        big_values: 1,
        global_gain: 210,
        table_select: 1,
    };
    let gr1 = GranuleSpec::default();

    // Codeword 0b01 for (1, 0), then a 0 sign bit.
    layer3_frame(HDR_L3_MONO, 0, &[gr0, gr1], &[0b0100_0000])
}

/// A silent joint stereo frame: every granule channel codes zero spectral data.
fn silent_joint_stereo_frame(main_data_begin: u32) -> Vec<u8> {
    layer3_frame(HDR_L3_JOINT_MS, main_data_begin, &[GranuleSpec::default(); 4], &[])
}

#[test]
fn decode_silent_joint_stereo_frame() {
    let frame = silent_joint_stereo_frame(0);

    let mut decoder = MpaDecoder::new();
    let audio = decoder.decode(&frame).unwrap();

    assert_eq!(audio.sample_rate, 32_000);
    assert_eq!(audio.channels, 2);
    // 2 granules x 576 samples x 2 channels.
    assert_eq!(audio.samples.len(), 2304);
    assert!(audio.samples.iter().all(|s| s.abs() < 1e-6));
}

#[test]
fn decode_single_spectral_line() {
    let frame = single_line_frame();

    let mut decoder = MpaDecoder::new();
    let audio = decoder.decode(&frame).unwrap();

    assert_eq!(audio.sample_rate, 32_000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 1152);

    // The first tap of the synthesis window is 0, so the first output sample of the stream is 0
    // regardless of the spectrum.
    assert!(audio.samples[0].abs() < 1e-5);

    // The second output sample has exactly one contribution: the spectral line passes through
    // the 36-point IMDCT (sample 0 of sub-band 0), the long block window, the synthesis matrix
    // row 1, and the second tap of the synthesis window.
    let sub_band_sample = (19.0 * PI / 72.0).cos() * (PI / 72.0).sin();
    let expected = sub_band_sample * (17.0 * PI / 64.0).cos() * -0.000015259;
    assert!((f64::from(audio.samples[1]) - expected).abs() < 1e-9);

    // The decode is not silent, and all samples are normalized.
    let peak = audio.samples.iter().fold(0f32, |acc, s| acc.max(s.abs()));
    assert!(peak > 1e-6);
    assert!(peak <= 1.0);
}

#[test]
fn decode_is_deterministic() {
    let frame = single_line_frame();

    let a = MpaDecoder::new().decode(&frame).unwrap();
    let b = MpaDecoder::new().decode(&frame).unwrap();

    assert_eq!(a.samples, b.samples);
}

#[test]
fn sync_scan_skips_leading_garbage() {
    let frame = single_line_frame();

    // A metadata-like prefix with no sync words in it.
    let mut stream = b"ID3\x04\x00garbage bytes preceding audio\x00\x01\x02".to_vec();
    stream.extend_from_slice(&frame);

    let clean = MpaDecoder::new().decode(&frame).unwrap();
    let dirty = MpaDecoder::new().decode(&stream).unwrap();

    assert_eq!(clean.samples, dirty.samples);
}

#[test]
fn decode_skipping_metadata_region() {
    let frame = single_line_frame();

    let mut stream = vec![0xaau8; 100];
    stream.extend_from_slice(&frame);

    let clean = MpaDecoder::new().decode(&frame).unwrap();
    let skipped = MpaDecoder::new().decode_skipping(&stream, 100).unwrap();

    assert_eq!(clean.samples, skipped.samples);
}

#[test]
fn filterbank_reaches_steady_state() {
    // Two identical frames whose second granule codes no spectral data: the overlap tail
    // entering each frame is zero, so the second frame must reproduce the first exactly, even
    // though both carry non-silent output in every granule.
    let frame = single_line_frame();

    let mut stream = frame.clone();
    stream.extend_from_slice(&frame);

    let audio = MpaDecoder::new().decode(&stream).unwrap();
    assert_eq!(audio.samples.len(), 2304);

    // The second granule of frame 2 equals the second granule of frame 1: by then the V vector
    // of the filterbank holds only state derived from the repeated spectrum. (The granules
    // before that differ, since the filterbank remembers up to 16 synthesis steps.)
    assert_eq!(audio.samples[1728..2304], audio.samples[576..1152]);

    // The second granule is not silent: it carries the overlap tail of the first.
    assert!(audio.samples[576..1152].iter().any(|s| s.abs() > 1e-9));
}

#[test]
fn decoding_a_frame_in_isolation_converges() {
    // Decoding frame N on a fresh decoder (zeroed overlap and V vector) differs from a
    // sequential decode of frames 1..N only within the leading overlap window. Here the error
    // is confined to the first granule; the second granule matches the sequential decode
    // exactly.
    let frame = single_line_frame();

    let mut stream = frame.clone();
    stream.extend_from_slice(&frame);

    let sequential = MpaDecoder::new().decode(&stream).unwrap();
    let isolated = MpaDecoder::new().decode(&frame).unwrap();

    assert_eq!(isolated.samples[576..1152], sequential.samples[1728..2304]);
}

#[test]
fn decoder_state_persists_across_calls() {
    let frame = single_line_frame();

    let mut stream = frame.clone();
    stream.extend_from_slice(&frame);

    let whole = MpaDecoder::new().decode(&stream).unwrap();

    let mut decoder = MpaDecoder::new();
    let first = decoder.decode(&frame).unwrap();
    let second = decoder.decode(&frame).unwrap();

    assert_eq!(first.samples[..], whole.samples[..1152]);
    assert_eq!(second.samples[..], whole.samples[1152..]);
}

#[test]
fn mid_side_decode_of_mid_only_signal() {
    // A joint stereo frame with the mid-side bit set, a spectral line in the mid channel, and
    // an empty side channel. After the MS matrix, left and right are identical.
    let gr0_ch0 = GranuleSpec {
        part2_3_length: 3,
        big_values: 1,
        global_gain: 210,
        table_select: 1,
    };
    let empty = GranuleSpec::default();

    let frame =
        layer3_frame(HDR_L3_JOINT_MS, 0, &[gr0_ch0, empty, empty, empty], &[0b0100_0000]);

    let audio = MpaDecoder::new().decode(&frame).unwrap();

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 2304);

    let mut peak = 0f32;
    for pair in audio.samples.chunks_exact(2) {
        assert_eq!(pair[0], pair[1]);
        peak = peak.max(pair[0].abs());
    }
    assert!(peak > 1e-6);
}

#[test]
fn reservoir_underflow_emits_silence_and_recovers() {
    // The first frame of the stream points 9 bytes back into a reservoir that holds nothing,
    // as happens when decoding starts mid-stream. The decoder must emit one frame of silence
    // and decode the following frame cleanly.
    let underflow = silent_joint_stereo_frame(9);
    let follow = silent_joint_stereo_frame(0);

    let mut stream = underflow;
    stream.extend_from_slice(&follow);

    let audio = MpaDecoder::new().decode(&stream).unwrap();

    assert_eq!(audio.samples.len(), 4608);
    assert!(audio.samples.iter().all(|s| s.abs() < 1e-6));
}

#[test]
fn truncated_final_frame_stops_decoding() {
    let frame = single_line_frame();

    let mut stream = frame.clone();
    // Append a frame header that promises 576 bytes but deliver only a fragment.
    stream.extend_from_slice(&frame[..40]);

    let audio = MpaDecoder::new().decode(&stream).unwrap();

    assert_eq!(audio.samples.len(), 1152);
}

#[test]
fn stream_without_frames_is_an_error() {
    let mut decoder = MpaDecoder::new();

    assert!(decoder.decode(b"no audio here, just text").is_err());
    assert!(decoder.decode(&[]).is_err());
}

#[test]
fn decode_silent_layer1_frame() {
    // A Layer I frame with a zero allocation in every sub-band: 16 bytes of allocation bits and
    // no scale factors or samples.
    let mut frame = HDR_L1_MONO.to_be_bytes().to_vec();
    frame.resize(48, 0);

    let audio = MpaDecoder::new().decode(&frame).unwrap();

    assert_eq!(audio.sample_rate, 32_000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 384);
    assert!(audio.samples.iter().all(|s| s.abs() < 1e-6));
}

#[test]
fn decode_layer1_constant_sub_band() {
    // Allocate 2 bits to sub-band 0 with a unity scale factor (index 3) and fill all 12 samples
    // with the raw value 0b10, which dequantizes to +2/3.
    let mut bw = BitWriter::new();
    bw.put(4, 1); // allocation sb0: nb = 2
    for _ in 1..32 {
        bw.put(4, 0);
    }
    bw.put(6, 3); // scale factor index 3 -> 1.0
    for _ in 0..12 {
        bw.put(2, 0b10);
    }

    let mut frame = HDR_L1_MONO.to_be_bytes().to_vec();
    frame.extend_from_slice(&bw.finish());
    frame.resize(48, 0);

    let audio = MpaDecoder::new().decode(&frame).unwrap();

    assert_eq!(audio.samples.len(), 384);

    let peak = audio.samples.iter().fold(0f32, |acc, s| acc.max(s.abs()));
    assert!(peak > 1e-3);
    assert!(peak <= 1.0);
}

#[test]
fn layer3_and_layer1_streams_are_independent() {
    // The same decoder instance decodes a Layer III stream and then a Layer I stream; layer
    // state must not leak between them.
    let mut decoder = MpaDecoder::new();

    let l3 = decoder.decode(&single_line_frame()).unwrap();
    assert_eq!(l3.samples.len(), 1152);

    let mut l1_frame = HDR_L1_MONO.to_be_bytes().to_vec();
    l1_frame.resize(48, 0);

    let l1 = decoder.decode(&l1_frame).unwrap();
    assert_eq!(l1.samples.len(), 384);
    assert!(l1.samples.iter().all(|s| s.abs() < 1e-6));
}
