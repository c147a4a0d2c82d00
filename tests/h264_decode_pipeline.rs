//! H.264 解码器端到端集成测试
//!
//! 用 BitWriter 合成最小的 Annex B 码流 (SPS + PPS + 切片),
//! 走注册表创建解码器, 验证完整的 send/receive 流程.

use ying::codec::{CodecId, CodecParameters, Decoder, Frame, Packet, PictureType};
use ying::core::{BitWriter, YingError};

// ============================================================
// 码流合成工具
// ============================================================

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

/// Baseline SPS: 2x2 宏块 (32x32), poc_type 0
fn build_sps() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(66, 8); // profile_idc (Baseline)
    bw.write_bits(0, 8); // constraint flags + reserved
    bw.write_bits(30, 8); // level_idc
    bw.write_ue(0); // sps_id
    bw.write_ue(0); // log2_max_frame_num_minus4
    bw.write_ue(0); // pic_order_cnt_type
    bw.write_ue(0); // log2_max_pic_order_cnt_lsb_minus4
    bw.write_ue(2); // num_ref_frames
    bw.write_bit(0); // gaps_in_frame_num_value_allowed_flag
    bw.write_ue(1); // pic_width_in_mbs_minus1
    bw.write_ue(1); // pic_height_in_map_units_minus1
    bw.write_bit(1); // frame_mbs_only_flag
    bw.write_bit(1); // direct_8x8_inference_flag
    bw.write_bit(0); // frame_cropping_flag
    bw.write_bit(0); // vui_parameters_present_flag
    bw.write_bit(1); // rbsp_stop_one_bit
    bw.align_to_byte();
    make_nal(0x67, &bw.finish())
}

/// CAVLC PPS, pic_init_qp 26
fn build_pps() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0); // pps_id
    bw.write_ue(0); // sps_id
    bw.write_bit(0); // entropy_coding_mode_flag (CAVLC)
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
    bw.write_bit(1); // rbsp_stop_one_bit
    bw.align_to_byte();
    make_nal(0x68, &bw.finish())
}

/// 无残差的 I16x16 DC 宏块
fn write_i16x16_mb(bw: &mut BitWriter) {
    bw.write_ue(1); // mb_type = I_16x16_0_0_0 (DC 预测, cbp 0)
    bw.write_ue(0); // intra_chroma_pred_mode = DC
    bw.write_se(0); // mb_qp_delta
    bw.write_bit(1); // 亮度 DC coeff_token, total_coeff = 0
}

/// IDR 切片, 覆盖 [first_mb, first_mb + mb_count)
fn build_idr_slice(first_mb: u32, mb_count: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(first_mb); // first_mb_in_slice
    bw.write_ue(7); // slice_type = I (all slices)
    bw.write_ue(0); // pps_id
    bw.write_bits(0, 4); // frame_num
    bw.write_ue(0); // idr_pic_id
    bw.write_bits(0, 4); // pic_order_cnt_lsb
    bw.write_bit(0); // no_output_of_prior_pics_flag
    bw.write_bit(0); // long_term_reference_flag
    bw.write_se(0); // slice_qp_delta
    bw.write_ue(1); // disable_deblocking_filter_idc
    for _ in 0..mb_count {
        write_i16x16_mb(&mut bw);
    }
    bw.write_bit(1); // rbsp_stop_one_bit
    bw.align_to_byte();
    make_nal(0x65, &bw.finish())
}

/// 整帧 skip 的 P 切片
fn build_p_skip_slice(frame_num: u32, poc_lsb: u32, skip_run: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0); // first_mb_in_slice
    bw.write_ue(5); // slice_type = P (all slices)
    bw.write_ue(0); // pps_id
    bw.write_bits(frame_num, 4);
    bw.write_bits(poc_lsb, 4);
    bw.write_bit(0); // num_ref_idx_active_override_flag
    bw.write_bit(0); // ref_pic_list_reordering_flag_l0
    bw.write_bit(0); // adaptive_ref_pic_marking_mode_flag
    bw.write_se(0); // slice_qp_delta
    bw.write_ue(1); // disable_deblocking_filter_idc
    bw.write_ue(skip_run); // mb_skip_run
    bw.write_bit(1); // rbsp_stop_one_bit
    bw.align_to_byte();
    make_nal(0x41, &bw.finish())
}

fn open_decoder() -> Box<dyn Decoder> {
    let registry = ying::default_codec_registry();
    let mut decoder = registry.create_decoder(CodecId::H264).unwrap();
    decoder.open(&CodecParameters::new(CodecId::H264)).unwrap();
    decoder
}

fn drain(decoder: &mut Box<dyn Decoder>) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        match decoder.receive_frame() {
            Ok(frame) => frames.push(frame),
            Err(YingError::NeedMoreData) | Err(YingError::Eof) => break,
            Err(e) => panic!("意外的解码错误: {e}"),
        }
    }
    frames
}

// ============================================================
// 端到端解码测试
// ============================================================

#[test]
fn test_idr_gop_decode() {
    let mut decoder = open_decoder();

    // IDR + 两个 P skip 帧, 各自独立送包
    let packets = [
        annexb(&[build_sps(), build_pps(), build_idr_slice(0, 4)]),
        annexb(&[build_p_skip_slice(1, 2, 4)]),
        annexb(&[build_p_skip_slice(2, 4, 4)]),
    ];

    let mut frames = Vec::new();
    for data in packets {
        decoder.send_packet(&Packet::from_data(data)).unwrap();
        frames.extend(drain(&mut decoder));
    }
    decoder.send_packet(&Packet::empty()).unwrap();
    frames.extend(drain(&mut decoder));

    assert_eq!(frames.len(), 3);

    let idr = frames[0].video();
    assert_eq!((idr.width, idr.height), (32, 32));
    assert!(idr.is_keyframe);
    assert_eq!(idr.picture_type, PictureType::I);
    assert_eq!(idr.poc, 0);
    // DC_128 预测且无残差: 三个平面全为 128
    for plane in &idr.data {
        assert!(plane.iter().all(|&p| p == 128));
    }

    let p1 = frames[1].video();
    assert_eq!(p1.picture_type, PictureType::P);
    assert!(!p1.is_keyframe);
    assert_eq!(p1.poc, 2);
    // skip 宏块原样复制参考帧
    assert!(p1.data[0].iter().all(|&p| p == 128));

    let p2 = frames[2].video();
    assert_eq!(p2.poc, 4);
    assert!(p2.data[0].iter().all(|&p| p == 128));
}

#[test]
fn test_多切片图像() {
    let mut decoder = open_decoder();

    // 同一 IDR 图像拆成两个切片, 各覆盖 2 个宏块
    let data = annexb(&[
        build_sps(),
        build_pps(),
        build_idr_slice(0, 2),
        build_idr_slice(2, 2),
    ]);
    decoder.send_packet(&Packet::from_data(data)).unwrap();

    let frames = drain(&mut decoder);
    assert_eq!(frames.len(), 1);
    let v = frames[0].video();
    assert_eq!((v.width, v.height), (32, 32));
    assert!(v.data[0].iter().all(|&p| p == 128));
}

#[test]
fn test_单包多帧() {
    let mut decoder = open_decoder();

    // 一个包里塞 IDR + P, 应产出两帧
    let data = annexb(&[
        build_sps(),
        build_pps(),
        build_idr_slice(0, 4),
        build_p_skip_slice(1, 2, 4),
    ]);
    decoder.send_packet(&Packet::from_data(data)).unwrap();

    let frames = drain(&mut decoder);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].video().picture_type, PictureType::I);
    assert_eq!(frames[1].video().picture_type, PictureType::P);
}

#[test]
fn test_缺少参数集时切片被拒() {
    let mut decoder = open_decoder();

    // 没有 SPS/PPS, 直接送 IDR 切片
    let data = annexb(&[build_idr_slice(0, 4)]);
    let err = decoder.send_packet(&Packet::from_data(data)).unwrap_err();
    assert!(matches!(err, YingError::InvalidData(_)));
}

#[test]
fn test_flush后重新解码() {
    let mut decoder = open_decoder();

    let gop = annexb(&[build_sps(), build_pps(), build_idr_slice(0, 4)]);
    decoder.send_packet(&Packet::from_data(gop.clone())).unwrap();
    assert_eq!(drain(&mut decoder).len(), 1);

    decoder.flush();
    assert!(matches!(
        decoder.receive_frame(),
        Err(YingError::NeedMoreData)
    ));

    decoder.send_packet(&Packet::from_data(gop)).unwrap();
    let frames = drain(&mut decoder);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].video().poc, 0);
}

#[test]
fn test_eof状态机() {
    let mut decoder = open_decoder();
    assert!(matches!(
        decoder.receive_frame(),
        Err(YingError::NeedMoreData)
    ));

    decoder.send_packet(&Packet::empty()).unwrap();
    assert!(matches!(decoder.receive_frame(), Err(YingError::Eof)));
}
