//! Ying 解码核心性能基准测试.
//!
//! 覆盖 Exp-Golomb 解析, NAL 切分与完整的 IDR+P 帧解码路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ying::codec::parsers::h264::nal::split_annex_b;
use ying::codec::{CodecId, CodecParameters, Decoder, Packet};
use ying::core::{BitReader, BitWriter};

/// RBSP 加 NAL 头, 插入 emulation prevention 字节
fn make_nal(header: u8, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 3 {
            out.push(3);
            zeros = 0;
        }
        out.push(b);
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    out
}

fn annexb(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

/// 8x8 宏块 (128x128) 的 Baseline SPS
fn build_sps() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(66, 8);
    bw.write_bits(0, 8);
    bw.write_bits(30, 8);
    bw.write_ue(0); // sps_id
    bw.write_ue(0); // log2_max_frame_num_minus4
    bw.write_ue(0); // pic_order_cnt_type
    bw.write_ue(0); // log2_max_pic_order_cnt_lsb_minus4
    bw.write_ue(2); // num_ref_frames
    bw.write_bit(0);
    bw.write_ue(7); // pic_width_in_mbs_minus1
    bw.write_ue(7); // pic_height_in_map_units_minus1
    bw.write_bit(1); // frame_mbs_only_flag
    bw.write_bit(1); // direct_8x8_inference_flag
    bw.write_bit(0); // frame_cropping_flag
    bw.write_bit(0); // vui_parameters_present_flag
    bw.write_bit(1);
    bw.align_to_byte();
    make_nal(0x67, &bw.finish())
}

fn build_pps() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0); // pps_id
    bw.write_ue(0); // sps_id
    bw.write_bit(0); // entropy_coding_mode_flag
    bw.write_bit(0); // pic_order_present_flag
    bw.write_ue(0); // num_slice_groups_minus1
    bw.write_ue(0); // num_ref_idx_l0_active_minus1
    bw.write_ue(0); // num_ref_idx_l1_active_minus1
    bw.write_bit(0); // weighted_pred_flag
    bw.write_bits(0, 2); // weighted_bipred_idc
    bw.write_se(0); // pic_init_qp_minus26
    bw.write_se(0); // pic_init_qs_minus26
    bw.write_se(0); // chroma_qp_index_offset
    bw.write_bit(1); // deblocking_filter_control_present_flag
    bw.write_bit(0); // constrained_intra_pred_flag
    bw.write_bit(0); // redundant_pic_cnt_present_flag
    bw.write_bit(1);
    bw.align_to_byte();
    make_nal(0x68, &bw.finish())
}

/// 64 个无残差 I16x16 宏块的 IDR 切片
fn build_idr_slice() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0); // first_mb_in_slice
    bw.write_ue(7); // slice_type = I
    bw.write_ue(0); // pps_id
    bw.write_bits(0, 4); // frame_num
    bw.write_ue(0); // idr_pic_id
    bw.write_bits(0, 4); // pic_order_cnt_lsb
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_se(0); // slice_qp_delta
    bw.write_ue(1); // disable_deblocking_filter_idc
    for _ in 0..64 {
        bw.write_ue(1); // mb_type = I_16x16_0_0_0
        bw.write_ue(0); // intra_chroma_pred_mode
        bw.write_se(0); // mb_qp_delta
        bw.write_bit(1); // 亮度 DC coeff_token
    }
    bw.write_bit(1);
    bw.align_to_byte();
    make_nal(0x65, &bw.finish())
}

/// 整帧 skip 的 P 切片
fn build_p_slice(frame_num: u32, poc_lsb: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(5); // slice_type = P
    bw.write_ue(0);
    bw.write_bits(frame_num, 4);
    bw.write_bits(poc_lsb, 4);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_se(0);
    bw.write_ue(1);
    bw.write_ue(64); // mb_skip_run
    bw.write_bit(1);
    bw.align_to_byte();
    make_nal(0x41, &bw.finish())
}

fn bench_exp_golomb(c: &mut Criterion) {
    // 1024 个交替的 ue/se 值
    let mut bw = BitWriter::new();
    for i in 0..1024u32 {
        bw.write_ue(i % 64);
        bw.write_se((i % 33) as i32 - 16);
    }
    let data = bw.finish();

    c.bench_function("exp_golomb_parse_2048", |b| {
        b.iter(|| {
            let mut br = BitReader::new(black_box(&data));
            let mut acc = 0i64;
            for _ in 0..1024 {
                acc += br.read_ue().unwrap() as i64;
                acc += br.read_se().unwrap() as i64;
            }
            black_box(acc)
        });
    });
}

fn bench_nal_split(c: &mut Criterion) {
    let stream = annexb(&[build_sps(), build_pps(), build_idr_slice(), build_p_slice(1, 2)]);

    c.bench_function("annexb_nal_split", |b| {
        b.iter(|| {
            let nalus = split_annex_b(black_box(&stream));
            black_box(nalus.len())
        });
    });
}

fn bench_decode_gop(c: &mut Criterion) {
    // IDR + 3 个 P 帧, 128x128
    let stream = annexb(&[
        build_sps(),
        build_pps(),
        build_idr_slice(),
        build_p_slice(1, 2),
        build_p_slice(2, 4),
        build_p_slice(3, 6),
    ]);
    let registry = ying::default_codec_registry();

    c.bench_function("h264_decode_gop_128x128", |b| {
        b.iter(|| {
            let mut decoder = registry.create_decoder(CodecId::H264).unwrap();
            decoder.open(&CodecParameters::new(CodecId::H264)).unwrap();
            decoder
                .send_packet(&Packet::from_data(black_box(stream.clone())))
                .unwrap();
            let mut frames = 0;
            while let Ok(frame) = decoder.receive_frame() {
                black_box(frame.video().width);
                frames += 1;
            }
            black_box(frames)
        });
    });
}

criterion_group!(benches, bench_exp_golomb, bench_nal_split, bench_decode_gop);
criterion_main!(benches);
