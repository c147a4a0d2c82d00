//! H.264/AVC Baseline 视频解码器.
//!
//! 支持 CAVLC 熵解码, I_4x4/I_16x16 帧内预测, P 帧运动补偿
//! (1/4 像素亮度, 1/8 像素色度) 与 P_Skip. 仅限逐行 4:2:0 8-bit 流;
//! CABAC, B 切片, FMO, 场编码与数据分区在解析阶段显式拒绝.

pub mod cavlc;
pub mod common;
pub mod macroblock;
pub mod motion;
pub mod parameter_sets;
pub mod picture;
pub mod predict;
pub mod reconstruct;
pub mod refpic;
pub mod slice;
pub mod syntax;
pub mod transform;
pub mod vlc;

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};
use ying_core::{BitReader, YingError, YingResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::frame::{Frame, PictureType};
use crate::packet::Packet;
use crate::parsers::h264::nal::{
    parse_avcc_config, split_annex_b, split_avcc, NalUnit, NalUnitType,
};

use macroblock::{predict_mv_pskip, MacroblockArena, MbBuilder, MbType};
use parameter_sets::{Pps, Sps};
use picture::Picture;
use reconstruct::reconstruct_macroblock;
use refpic::{PocContext, ReferenceQueue};
use slice::{more_rbsp_data, parse_slice_header, SliceHeader, SliceType};
use syntax::{MacroblockSyntax, MbResiduals, SliceEntropy};
use vlc::VlcTables;

/// 正在解码的图像及其逐图像状态
struct CurrentPicture {
    picture: Picture,
    arena: MacroblockArena,
    sps: Sps,
    picture_type: PictureType,
    /// 已进入本图像的切片数, 兼作下一切片的 slice_id
    slice_count: u32,
    ref_idc: u8,
    pts: i64,
}

/// H.264 解码器
pub struct H264Decoder {
    tables: VlcTables,
    sps_map: HashMap<u32, Sps>,
    pps_map: HashMap<u32, Pps>,
    /// AVCC 长度前缀字节数; None 表示 Annex B 输入
    length_size: Option<usize>,
    poc: PocContext,
    refs: ReferenceQueue,
    current: Option<CurrentPicture>,
    output: VecDeque<Frame>,
    prev_frame_num: Option<u32>,
    opened: bool,
    flushing: bool,
}

impl H264Decoder {
    pub fn new() -> YingResult<Self> {
        Ok(Self {
            tables: VlcTables::new()?,
            sps_map: HashMap::new(),
            pps_map: HashMap::new(),
            length_size: None,
            poc: PocContext::new(),
            refs: ReferenceQueue::new(),
            current: None,
            output: VecDeque::new(),
            prev_frame_num: None,
            opened: false,
            flushing: false,
        })
    }

    fn handle_sps(&mut self, nalu: &NalUnit) {
        match Sps::parse(&nalu.rbsp()) {
            Ok(sps) => {
                debug!(
                    "H264: SPS id={} {}x{} profile={} level={}",
                    sps.sps_id,
                    sps.width(),
                    sps.height(),
                    sps.profile_idc,
                    sps.level_idc
                );
                self.sps_map.insert(sps.sps_id, sps);
            }
            Err(err) => warn!("H264: SPS 解析失败, err={}", err),
        }
    }

    fn handle_pps(&mut self, nalu: &NalUnit) {
        match Pps::parse(&nalu.rbsp()) {
            Ok(pps) => {
                debug!(
                    "H264: PPS id={} sps={} entropy={} qp={}",
                    pps.pps_id,
                    pps.sps_id,
                    if pps.entropy_coding_mode { "CABAC" } else { "CAVLC" },
                    pps.pic_init_qp
                );
                self.pps_map.insert(pps.pps_id, pps);
            }
            Err(err) => warn!("H264: PPS 解析失败, err={}", err),
        }
    }

    /// 丢弃未解码完的图像 (数据缺损或流在图像中途截断)
    fn discard_incomplete_picture(&mut self) {
        if let Some(cur) = self.current.take() {
            warn!(
                "H264: 丢弃不完整图像, decoded={}/{}",
                cur.arena.decoded_count(),
                cur.arena.mb_count()
            );
        }
    }

    /// 图像所有宏块解码完成后: 扩展填充带, 产出输出帧, 登记参考帧
    fn finalize_picture(&mut self) {
        let Some(mut cur) = self.current.take() else {
            return;
        };
        cur.picture.expand_borders();

        let mut frame = cur.picture.to_video_frame(&cur.sps, cur.picture_type);
        frame.pts = cur.pts;
        debug!(
            "H264: 图像完成, poc={} type={:?} {}x{}",
            cur.picture.poc, cur.picture_type, frame.width, frame.height
        );
        self.output.push_back(Frame::Video(frame));

        if cur.ref_idc != 0 {
            self.refs.push(cur.picture, &cur.sps);
        }
    }

    fn decode_slice(&mut self, nalu: &NalUnit, pts: i64) -> YingResult<()> {
        let is_idr = nalu.nal_type.is_idr();
        let rbsp = nalu.rbsp();
        let mut br = BitReader::new(&rbsp);
        let (header, sps, pps) =
            parse_slice_header(&mut br, &self.sps_map, &self.pps_map, is_idr, nalu.ref_idc)?;
        let (sps, pps) = (sps.clone(), pps.clone());

        // frame_num 间隙检测 (gaps_in_frame_num): 仅告警, 继续解码
        if !header.is_idr {
            if let Some(prev) = self.prev_frame_num {
                let expected = (prev + 1) % (1 << sps.log2_max_frame_num);
                if header.frame_num != prev && header.frame_num != expected {
                    warn!(
                        "H264: frame_num 不连续, prev={} cur={}",
                        prev, header.frame_num
                    );
                }
            }
        }
        self.prev_frame_num = Some(header.frame_num);

        let poc_value = self.poc.compute(&sps, &header)?;
        if header.is_idr && header.first_mb == 0 {
            self.refs.clear();
        }

        let mb_count = sps.mb_count();
        if header.first_mb >= mb_count {
            return Err(YingError::InvalidData(format!(
                "H264: first_mb_in_slice 越界, value={} mb_count={}",
                header.first_mb, mb_count
            )));
        }

        if header.first_mb == 0 {
            self.discard_incomplete_picture();
            let mut picture = Picture::new(&sps);
            picture.poc = poc_value;
            picture.frame_num = header.frame_num;
            picture.is_idr = header.is_idr;
            self.current = Some(CurrentPicture {
                picture,
                arena: MacroblockArena::new(sps.mb_width as usize, sps.mb_height as usize),
                sps: sps.clone(),
                picture_type: PictureType::I,
                slice_count: 0,
                ref_idc: nalu.ref_idc,
                pts,
            });
        } else {
            match self.current.as_ref() {
                Some(cur) if cur.sps.sps_id == sps.sps_id => {}
                Some(_) => {
                    return Err(YingError::InvalidData(
                        "H264: 图像中途切换 SPS".into(),
                    ));
                }
                None => {
                    return Err(YingError::InvalidData(format!(
                        "H264: 切片不从图像首宏块开始且无进行中的图像, first_mb={}",
                        header.first_mb
                    )));
                }
            }
        }

        let mut entropy = SliceEntropy::new(&pps, &self.tables)?;
        let list0 = self
            .refs
            .build_list0(poc_value, header.num_ref_idx_l0_active as usize);
        if header.slice_type == SliceType::P && list0.is_empty() {
            return Err(YingError::InvalidData(
                "H264: P 切片无可用参考帧".into(),
            ));
        }

        let Some(cur) = self.current.as_mut() else {
            return Err(YingError::Internal("H264: 当前图像状态缺失".into()));
        };
        if header.slice_type == SliceType::P {
            cur.picture_type = PictureType::P;
        }
        cur.ref_idc = nalu.ref_idc;

        decode_slice_data(&mut br, &mut entropy, &header, &pps, cur, &list0)?;
        cur.slice_count += 1;
        let complete = cur.arena.decoded_count() == cur.arena.mb_count();

        drop(list0);
        if complete {
            self.finalize_picture();
        }
        Ok(())
    }
}

/// 解码一个切片的宏块层数据, 从 first_mb 起按光栅序推进
fn decode_slice_data(
    br: &mut BitReader,
    entropy: &mut SliceEntropy<'_>,
    header: &SliceHeader,
    pps: &Pps,
    cur: &mut CurrentPicture,
    list0: &[&Picture],
) -> YingResult<()> {
    let mb_count = cur.arena.mb_count() as u32;
    let mb_width = cur.arena.width() as u32;
    let slice_id = cur.slice_count;
    let slice_qp = header.slice_qp(pps);
    let is_p = header.slice_type == SliceType::P;

    let mut residuals = MbResiduals::zeroed();
    let skip_residuals = MbResiduals::zeroed();
    let mut mb_addr = header.first_mb;

    while more_rbsp_data(br) {
        if is_p {
            let run = entropy.read_skip_run(br)?;
            for _ in 0..run {
                if mb_addr >= mb_count {
                    return Err(YingError::InvalidData(format!(
                        "H264: mb_skip_run 越过图像末尾, addr={} mb_count={}",
                        mb_addr, mb_count
                    )));
                }
                let x = (mb_addr % mb_width) as usize;
                let y = (mb_addr / mb_width) as usize;
                let mut builder = MbBuilder::new(x, y, slice_id);
                builder.mb.mb_type = MbType::PSkip;
                builder.mb.qp = slice_qp;
                let mv = predict_mv_pskip(&cur.arena, &builder);
                builder.set_partition(0, 0, 4, 4, 0, mv);
                reconstruct_macroblock(
                    &mut cur.picture,
                    &cur.arena,
                    &builder,
                    &skip_residuals,
                    pps,
                    list0,
                )?;
                cur.arena.put(x, y, builder.freeze());
                mb_addr += 1;
            }
            if !more_rbsp_data(br) {
                break;
            }
        }

        if mb_addr >= mb_count {
            return Err(YingError::InvalidData(format!(
                "H264: 宏块地址越过图像末尾, addr={} mb_count={}",
                mb_addr, mb_count
            )));
        }
        let x = (mb_addr % mb_width) as usize;
        let y = (mb_addr / mb_width) as usize;
        let mut builder = MbBuilder::new(x, y, slice_id);
        entropy.read_macroblock(br, &cur.arena, &mut builder, header, pps, &mut residuals)?;
        reconstruct_macroblock(&mut cur.picture, &cur.arena, &builder, &residuals, pps, list0)?;
        cur.arena.put(x, y, builder.freeze());
        mb_addr += 1;
    }

    Ok(())
}

// ============================================================
// Decoder trait 实现
// ============================================================

impl Decoder for H264Decoder {
    fn codec_id(&self) -> CodecId {
        CodecId::H264
    }

    fn name(&self) -> &str {
        "h264"
    }

    fn open(&mut self, params: &CodecParameters) -> YingResult<()> {
        self.sps_map.clear();
        self.pps_map.clear();
        self.length_size = None;

        if !params.extra_data.is_empty() {
            if params.extra_data[0] == 1 {
                // AVCDecoderConfigurationRecord
                let config = parse_avcc_config(&params.extra_data)?;
                self.length_size = Some(config.length_size);
                for raw in config.sps_list.iter().chain(config.pps_list.iter()) {
                    let nalu = NalUnit::parse(raw)?;
                    match nalu.nal_type {
                        NalUnitType::Sps => self.handle_sps(&nalu),
                        NalUnitType::Pps => self.handle_pps(&nalu),
                        other => warn!("H264: avcC 中出现意外 NAL, type={}", other),
                    }
                }
            } else {
                // Annex B 形式的带内参数集
                for nalu in split_annex_b(&params.extra_data) {
                    match nalu.nal_type {
                        NalUnitType::Sps => self.handle_sps(&nalu),
                        NalUnitType::Pps => self.handle_pps(&nalu),
                        _ => {}
                    }
                }
            }
        }

        self.opened = true;
        debug!(
            "H264: 解码器已打开, sps={} pps={} format={}",
            self.sps_map.len(),
            self.pps_map.len(),
            if self.length_size.is_some() { "avcc" } else { "annexb" }
        );
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> YingResult<()> {
        if !self.opened {
            return Err(YingError::InvalidData("H264: 解码器未打开".into()));
        }
        if packet.is_empty() {
            self.flushing = true;
            self.discard_incomplete_picture();
            return Ok(());
        }

        let nalus = match self.length_size {
            Some(n) => split_avcc(&packet.data, n),
            None => split_annex_b(&packet.data),
        };

        for nalu in &nalus {
            match nalu.nal_type {
                NalUnitType::Sps => self.handle_sps(nalu),
                NalUnitType::Pps => self.handle_pps(nalu),
                NalUnitType::Slice | NalUnitType::SliceIdr => {
                    self.decode_slice(nalu, packet.pts)?;
                }
                NalUnitType::SliceDpa | NalUnitType::SliceDpb | NalUnitType::SliceDpc => {
                    return Err(YingError::Unsupported(
                        "H264: 不支持数据分区切片 (DPA/DPB/DPC)".into(),
                    ));
                }
                other => debug!("H264: 跳过 {} NAL", other),
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> YingResult<Frame> {
        if let Some(frame) = self.output.pop_front() {
            Ok(frame)
        } else if self.flushing {
            Err(YingError::Eof)
        } else {
            Err(YingError::NeedMoreData)
        }
    }

    fn flush(&mut self) {
        self.output.clear();
        self.current = None;
        self.refs.clear();
        self.poc.reset();
        self.prev_frame_num = None;
        self.flushing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parameter_sets::test_util::{PpsBuilder, SpsBuilder};
    use ying_core::BitWriter;

    /// RBSP → NAL 单元字节 (加头部, 插入 emulation prevention)
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

    /// 1 宏块 (16x16) 的 SPS + PPS
    fn tiny_parameter_sets() -> (Vec<u8>, Vec<u8>) {
        let mut sb = SpsBuilder::default();
        sb.mb_width_minus1 = 0;
        sb.mb_height_minus1 = 0;
        let sps = make_nal(0x67, &sb.build());
        let pps = make_nal(0x68, &PpsBuilder::default().build());
        (sps, pps)
    }

    /// 单宏块 IDR 切片: 一个无残差的 I16x16 DC 宏块
    fn tiny_idr_slice() -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_ue(0); // first_mb_in_slice
        bw.write_ue(7); // slice_type = I (all slices)
        bw.write_ue(0); // pps_id
        bw.write_bits(0, 4); // frame_num
        bw.write_ue(0); // idr_pic_id
        bw.write_bits(0, 4); // pic_order_cnt_lsb
        bw.write_bit(0); // no_output_of_prior_pics_flag
        bw.write_bit(0); // long_term_reference_flag
        bw.write_se(0); // slice_qp_delta
        bw.write_ue(1); // disable_deblocking_filter_idc
        // 宏块: I16x16 DC, cbp 0
        bw.write_ue(1); // mb_type
        bw.write_ue(0); // intra_chroma_pred_mode
        bw.write_se(0); // mb_qp_delta
        bw.write_bit(1); // 亮度 DC coeff_token: total=0
        bw.write_bit(1); // rbsp_stop_one_bit
        bw.align_to_byte();
        make_nal(0x65, &bw.finish())
    }

    /// 单宏块 P 切片: 整帧 skip
    fn tiny_p_skip_slice(frame_num: u32, poc_lsb: u32) -> Vec<u8> {
        tiny_p_skip_slice_run(frame_num, poc_lsb, 1)
    }

    fn tiny_p_skip_slice_run(frame_num: u32, poc_lsb: u32, skip_run: u32) -> Vec<u8> {
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
        bw.write_ue(skip_run);
        bw.write_bit(1); // rbsp_stop_one_bit
        bw.align_to_byte();
        make_nal(0x41, &bw.finish())
    }

    fn opened_decoder() -> H264Decoder {
        let mut dec = H264Decoder::new().unwrap();
        dec.open(&CodecParameters::new(CodecId::H264)).unwrap();
        dec
    }

    #[test]
    fn test_解码单宏块idr() {
        let mut dec = opened_decoder();
        let (sps, pps) = tiny_parameter_sets();
        let packet = Packet::from_data(annexb(&[sps, pps, tiny_idr_slice()]));

        dec.send_packet(&packet).unwrap();
        let frame = dec.receive_frame().unwrap();
        let v = frame.video();
        assert_eq!(v.width, 16);
        assert_eq!(v.height, 16);
        assert!(v.is_keyframe);
        assert_eq!(v.picture_type, PictureType::I);
        assert_eq!(v.poc, 0);
        // DC_128 预测, 无残差
        assert!(v.data[0].iter().all(|&p| p == 128));
        assert!(v.data[1].iter().all(|&p| p == 128));
        assert!(v.data[2].iter().all(|&p| p == 128));
    }

    #[test]
    fn test_idr后解码p_skip帧() {
        let mut dec = opened_decoder();
        let (sps, pps) = tiny_parameter_sets();

        dec.send_packet(&Packet::from_data(annexb(&[sps, pps, tiny_idr_slice()])))
            .unwrap();
        let _ = dec.receive_frame().unwrap();

        dec.send_packet(&Packet::from_data(annexb(&[tiny_p_skip_slice(1, 2)])))
            .unwrap();
        let frame = dec.receive_frame().unwrap();
        let v = frame.video();
        assert_eq!(v.picture_type, PictureType::P);
        assert!(!v.is_keyframe);
        assert_eq!(v.poc, 2);
        // skip 宏块复制参考帧
        assert!(v.data[0].iter().all(|&p| p == 128));
    }

    #[test]
    fn test_skip_run越界报错() {
        let mut dec = opened_decoder();
        let (sps, pps) = tiny_parameter_sets();
        dec.send_packet(&Packet::from_data(annexb(&[sps, pps, tiny_idr_slice()])))
            .unwrap();
        let _ = dec.receive_frame().unwrap();

        // 1 宏块的图像上 skip_run = 3 越过图像末尾
        let err = dec
            .send_packet(&Packet::from_data(annexb(&[tiny_p_skip_slice_run(
                1, 2, 3,
            )])))
            .unwrap_err();
        assert!(matches!(err, YingError::InvalidData(_)));
    }

    #[test]
    fn test_无参考帧的p切片报错() {
        let mut dec = opened_decoder();
        let (sps, pps) = tiny_parameter_sets();
        dec.send_packet(&Packet::from_data(annexb(&[sps, pps])))
            .unwrap();

        let err = dec
            .send_packet(&Packet::from_data(annexb(&[tiny_p_skip_slice(0, 0)])))
            .unwrap_err();
        assert!(matches!(err, YingError::InvalidData(_)));
    }

    #[test]
    fn test_receive状态机() {
        let mut dec = opened_decoder();
        assert!(matches!(
            dec.receive_frame(),
            Err(YingError::NeedMoreData)
        ));

        dec.send_packet(&Packet::empty()).unwrap();
        assert!(matches!(dec.receive_frame(), Err(YingError::Eof)));
    }

    #[test]
    fn test_flush后可重新解码() {
        let mut dec = opened_decoder();
        let (sps, pps) = tiny_parameter_sets();
        dec.send_packet(&Packet::from_data(annexb(&[
            sps.clone(),
            pps.clone(),
            tiny_idr_slice(),
        ])))
        .unwrap();
        let _ = dec.receive_frame().unwrap();

        dec.flush();
        assert!(matches!(
            dec.receive_frame(),
            Err(YingError::NeedMoreData)
        ));

        dec.send_packet(&Packet::from_data(annexb(&[sps, pps, tiny_idr_slice()])))
            .unwrap();
        let frame = dec.receive_frame().unwrap();
        assert_eq!(frame.video().poc, 0);
    }

    #[test]
    fn test_数据分区切片拒绝() {
        let mut dec = opened_decoder();
        // NAL type 2 = DPA
        let dpa = vec![0x42u8, 0x00];
        let err = dec
            .send_packet(&Packet::from_data(annexb(&[dpa])))
            .unwrap_err();
        assert!(matches!(err, YingError::Unsupported(_)));
    }

    #[test]
    fn test_未打开时送包报错() {
        let mut dec = H264Decoder::new().unwrap();
        let err = dec
            .send_packet(&Packet::from_data(vec![0u8, 0, 0, 1, 0x65]))
            .unwrap_err();
        assert!(matches!(err, YingError::InvalidData(_)));
    }

    #[test]
    fn test_avcc_extradata配置() {
        let mut sb = SpsBuilder::default();
        sb.mb_width_minus1 = 0;
        sb.mb_height_minus1 = 0;
        let sps = make_nal(0x67, &sb.build());
        let pps = make_nal(0x68, &PpsBuilder::default().build());

        let mut extra = vec![1, 66, 0, 30, 0xFF, 0xE1];
        extra.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        extra.extend_from_slice(&sps);
        extra.push(1);
        extra.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        extra.extend_from_slice(&pps);

        let mut params = CodecParameters::new(CodecId::H264);
        params.extra_data = extra;
        let mut dec = H264Decoder::new().unwrap();
        dec.open(&params).unwrap();
        assert_eq!(dec.length_size, Some(4));

        // AVCC 长度前缀包
        let idr = tiny_idr_slice();
        let mut data = (idr.len() as u32).to_be_bytes().to_vec();
        data.extend_from_slice(&idr);
        dec.send_packet(&Packet::from_data(data)).unwrap();
        let frame = dec.receive_frame().unwrap();
        assert_eq!(frame.video().width, 16);
    }
}
